//! Run command: the poll loop.

use anyhow::Result;
use std::path::Path;
use std::time::{Duration, Instant};
use sw_connectors::PanosSessionFactory;
use sw_core::{
    run_cycle, shutdown_channel, ConnectionResolver, CredentialSource, ResolveError,
    SessionFactory, Shutdown,
};
use tracing::{error, info, warn};

use crate::config::{AppConfig, ConfigKeyStore};
use crate::prompt::TerminalPrompt;

/// Whether to stop after one cycle or keep polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Once,
    Daemon,
}

impl RunMode {
    /// Command-line flags override `daemon_mode` from the config file.
    pub fn from_flags(once: bool, daemon: bool, config: &AppConfig) -> Self {
        if once {
            RunMode::Once
        } else if daemon || config.daemon_mode {
            RunMode::Daemon
        } else {
            RunMode::Once
        }
    }
}

/// Runs the poller against the live management API until it finishes or
/// Ctrl+C is pressed.
pub async fn run_poller(mut config: AppConfig, config_path: &Path, mode: RunMode) -> Result<()> {
    let factory = PanosSessionFactory {
        verify_tls: config.verify_tls,
        ..Default::default()
    };

    let (trigger, shutdown) = shutdown_channel();
    let listen_for_ctrl_c = move || {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C pressed. Gracefully exiting.");
                trigger.trigger();
            }
        });
    };

    poll(
        &mut config,
        config_path,
        &factory,
        &TerminalPrompt,
        mode,
        shutdown,
        listen_for_ctrl_c,
    )
    .await?;
    Ok(())
}

/// Resolves clusters and runs cycles. Returns the number of completed cycles.
///
/// `on_keys_ready` runs once, after the first resolution. Only that resolution
/// can prompt for credentials, so an interrupt handler installed from it
/// leaves Ctrl+C at the prompt with its default behaviour.
pub async fn poll(
    config: &mut AppConfig,
    config_path: &Path,
    factory: &dyn SessionFactory,
    credentials: &dyn CredentialSource,
    mode: RunMode,
    mut shutdown: Shutdown,
    on_keys_ready: impl FnOnce(),
) -> Result<usize, ResolveError> {
    let mut on_keys_ready = Some(on_keys_ready);
    let options = config.cycle_options();
    let interval = Duration::from_secs(config.check_interval);
    let mut clusters = config.to_clusters();
    let resolver = ConnectionResolver::new(factory, credentials);
    let mut cycles = 0;

    info!(
        "Starting shadow rule poller: {} clusters, {:?} mode",
        clusters.len(),
        mode
    );

    while !shutdown.is_requested() {
        let started = Instant::now();

        let sessions = {
            let mut store = ConfigKeyStore::new(config, config_path);
            resolver
                .resolve(&mut clusters, &mut store)
                .await
                .map_err(|e| {
                    error!("{}", e);
                    e
                })?
        };
        if let Some(ready) = on_keys_ready.take() {
            ready();
        }
        if sessions.is_empty() {
            warn!("No cluster is reachable this cycle");
        }

        let report = run_cycle(&sessions, &options, &shutdown).await;
        cycles += 1;
        info!(
            "Cycle {} finished in {:.1?}: {} device groups, {} shadowed rules, {} writes, {} failed device groups",
            cycles,
            started.elapsed(),
            report.device_groups.len(),
            report.total_shadowed(),
            report.total_writes(),
            report.failed_device_groups
        );

        if report.interrupted || mode == RunMode::Once {
            break;
        }
        info!("Sleeping {} seconds", interval.as_secs());
        if shutdown.sleep(interval).await {
            break;
        }
    }

    Ok(cycles)
}
