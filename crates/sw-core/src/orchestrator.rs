//! One poll cycle: discover shadow groups and annotate them on every active
//! cluster, strictly one call at a time.

use crate::annotate::{AnnotationReport, Annotator};
use crate::manager::DeviceGroup;
use crate::resolver::ActiveSession;
use crate::shadow::{discover_shadow_groups, MemberOrder};
use std::time::Duration;
use tokio::sync::watch;
use sw_observability::{cluster_span, group_span};
use tracing::{error, info, warn, Instrument};

/// Read side of the shutdown flag. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Write side of the shutdown flag.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Creates a linked trigger/flag pair.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested. Never resolves if the trigger is
    /// dropped without firing.
    pub async fn requested(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleeps for `duration`. Returns `true` if woken by a shutdown request.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.requested() => true,
        }
    }
}

/// Settings applied to every device group in a cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleOptions {
    pub risk_enabled: bool,
    pub member_order: MemberOrder,
}

/// Result of processing one device group.
#[derive(Debug, Clone)]
pub struct DeviceGroupReport {
    pub cluster: String,
    pub device_group: String,
    pub groups: usize,
    pub shadowed_rules: usize,
    pub failed_heads: Vec<String>,
    pub annotation: AnnotationReport,
}

/// Result of a whole poll cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub device_groups: Vec<DeviceGroupReport>,
    /// Device groups whose discovery or rule fetch failed.
    pub failed_device_groups: usize,
    pub interrupted: bool,
}

impl CycleReport {
    pub fn total_writes(&self) -> usize {
        self.device_groups.iter().map(|d| d.annotation.written).sum()
    }

    pub fn total_shadowed(&self) -> usize {
        self.device_groups.iter().map(|d| d.shadowed_rules).sum()
    }
}

/// Keeps the device groups named by `selector`, or all when it is `None`.
pub fn select_device_groups(
    available: Vec<DeviceGroup>,
    selector: Option<&[String]>,
) -> Vec<DeviceGroup> {
    let Some(wanted) = selector else {
        return available;
    };
    for name in wanted {
        if !available.iter().any(|dg| &dg.name == name) {
            warn!("Configured device group '{}' does not exist", name);
        }
    }
    available
        .into_iter()
        .filter(|dg| wanted.contains(&dg.name))
        .collect()
}

/// Runs one poll cycle over the resolved sessions.
pub async fn run_cycle(
    sessions: &[ActiveSession],
    options: &CycleOptions,
    shutdown: &Shutdown,
) -> CycleReport {
    let mut report = CycleReport::default();

    for session in sessions {
        if shutdown.is_requested() {
            report.interrupted = true;
            break;
        }
        let span = cluster_span!(session.cluster, host = %session.manager.hostname());
        run_session(session, options, shutdown, &mut report)
            .instrument(span)
            .await;
    }

    report
}

async fn run_session(
    session: &ActiveSession,
    options: &CycleOptions,
    shutdown: &Shutdown,
    report: &mut CycleReport,
) {
    let manager = session.manager.as_ref();
    let available = match manager.device_groups().await {
        Ok(groups) => groups,
        Err(e) => {
            error!("Failed to list device groups on {}: {}", session.cluster, e);
            report.failed_device_groups += 1;
            return;
        }
    };

    for device_group in select_device_groups(available, session.device_groups.as_deref()) {
        if shutdown.is_requested() {
            report.interrupted = true;
            return;
        }
        info!("Processing device group '{}'", device_group.name);
        let span = group_span!(device_group.name);
        match run_device_group(session, &device_group, options, shutdown)
            .instrument(span)
            .await
        {
            Some(dg_report) => report.device_groups.push(dg_report),
            None => report.failed_device_groups += 1,
        }
    }
}

/// Discovers and annotates one device group. Returns `None` when discovery
/// or the rule fetch failed.
async fn run_device_group(
    session: &ActiveSession,
    device_group: &DeviceGroup,
    options: &CycleOptions,
    shutdown: &Shutdown,
) -> Option<DeviceGroupReport> {
    let manager = session.manager.as_ref();
    let discovery = match discover_shadow_groups(manager, device_group, options.member_order).await
    {
        Ok(discovery) => discovery,
        Err(e) => {
            error!("Shadow discovery failed for '{}': {}", device_group.name, e);
            return None;
        }
    };

    let mut dg_report = DeviceGroupReport {
        cluster: session.cluster.clone(),
        device_group: device_group.name.clone(),
        groups: discovery.groups.len(),
        shadowed_rules: discovery.shadow_count(),
        failed_heads: discovery.failed_heads.clone(),
        annotation: AnnotationReport::default(),
    };

    if !discovery.groups.is_empty() {
        let mut rules = match manager.fetch_rules(&device_group.name).await {
            Ok(rules) => rules,
            Err(e) => {
                error!("Failed to fetch rules for '{}': {}", device_group.name, e);
                return None;
            }
        };
        dg_report.annotation = Annotator::new(manager, &device_group.name)
            .with_shutdown(shutdown.clone())
            .apply(&discovery.groups, &mut rules, options.risk_enabled)
            .await;
    }

    info!(
        groups = dg_report.groups,
        shadowed = dg_report.shadowed_rules,
        written = dg_report.annotation.written,
        unchanged = dg_report.annotation.already_correct,
        failed = dg_report.annotation.failed.len(),
        "Device group '{}' done",
        device_group.name
    );
    Some(dg_report)
}
