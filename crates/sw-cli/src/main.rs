//! Shadow Warden CLI
//!
//! Finds shadowed security rules on PAN-OS firewalls and Panorama and tags
//! them so every group of shadowed rules can be reviewed together.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use sw_observability::logging::{init_logging_with_config, LoggingConfig};
use tracing::warn;

mod commands;
mod config;
mod prompt;
mod validator;

use commands::{run_poller, RunMode};
use config::AppConfig;
use validator::ConfigValidator;

const DEFAULT_CONFIG_FILE: &str = "config.yml";

#[derive(Parser)]
#[command(name = "shadow-warden")]
#[command(version)]
#[command(about = "Tags shadowed security rules on PAN-OS firewalls and Panorama", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Debug output on the console (also accepted as -debug)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured clusters and tag shadowed rules (default)
    Run {
        /// Run a single cycle even if daemon_mode is set
        #[arg(long, conflicts_with = "daemon")]
        once: bool,

        /// Keep polling every check_interval seconds until interrupted
        #[arg(long)]
        daemon: bool,
    },

    /// Validate configuration
    Validate,

    /// Show current configuration
    Config {
        /// Show API keys
        #[arg(long)]
        show_secrets: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command.unwrap_or(Commands::Run {
        once: false,
        daemon: false,
    }) {
        Commands::Run { once, daemon } => cmd_run(&config_path, once, daemon, cli.debug).await,
        Commands::Validate => cmd_validate(&config_path),
        Commands::Config { show_secrets } => cmd_config(&config_path, show_secrets),
    }
}

/// Accepts the single-dash `-debug` spelling.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| {
            if arg == "-debug" {
                OsString::from("--debug")
            } else {
                arg
            }
        })
        .collect()
}

fn default_config_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return local;
    }
    match directories::ProjectDirs::from("com", "shadow-warden", "shadow-warden") {
        Some(dirs) if dirs.config_dir().join(DEFAULT_CONFIG_FILE).exists() => {
            dirs.config_dir().join(DEFAULT_CONFIG_FILE)
        }
        _ => local,
    }
}

fn load_or_exit(config_path: &Path) -> AppConfig {
    match AppConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {:#}", "Configuration file error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn cmd_run(config_path: &Path, once: bool, daemon: bool, debug: bool) -> Result<()> {
    let config = load_or_exit(config_path);

    let logging = if debug {
        LoggingConfig::development()
    } else {
        LoggingConfig::default()
    };
    init_logging_with_config(logging.with_log_dir(&config.log_path))
        .context("Failed to initialize logging")?;

    let validation = ConfigValidator::validate(&config);
    if validation.has_errors() {
        validation.print();
        println!();
        println!(
            "{}",
            "Configuration validation failed. Fix the errors above."
                .red()
                .bold()
        );
        std::process::exit(1);
    }
    for warning in &validation.warnings {
        warn!("{}", warning);
    }

    let mode = RunMode::from_flags(once, daemon, &config);
    run_poller(config, config_path, mode).await
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!(
        "Validating configuration: {}",
        config_path.display().to_string().cyan()
    );

    let config = load_or_exit(config_path);

    let validation_result = ConfigValidator::validate(&config);
    validation_result.print();

    println!();
    println!("{}", "Configuration Summary".bold());
    println!("─────────────────────");
    println!("  Panoramas: {}", config.panoramas.len());
    println!("  Firewalls: {}", config.firewalls.len());
    println!(
        "  Mode: {}",
        if config.daemon_mode {
            format!("daemon (every {}s)", config.check_interval)
        } else {
            "single run".to_string()
        }
    );
    println!("  Risk scoring: {}", config.risk_scoring);
    println!("  Log directory: {}", config.log_path.display());

    if validation_result.has_errors() {
        println!();
        println!(
            "{}",
            "Configuration validation failed. Fix the errors above."
                .red()
                .bold()
        );
        std::process::exit(1);
    } else if validation_result.has_warnings() {
        println!();
        println!(
            "{}",
            "Configuration is valid with warnings. Review the warnings above."
                .yellow()
                .bold()
        );
    } else {
        println!();
        println!("{}", "Configuration is valid.".green().bold());
    }

    Ok(())
}

fn cmd_config(config_path: &Path, show_secrets: bool) -> Result<()> {
    let config = load_or_exit(config_path);
    let display_config = if show_secrets {
        config
    } else {
        config.redact_secrets()
    };

    println!("{}", "Current Configuration".bold());
    println!("─────────────────────────");
    print!("{}", serde_yaml::to_string(&display_config)?);

    Ok(())
}
