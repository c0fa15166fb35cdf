//! Logging infrastructure for Shadow Warden.
//!
//! Console output goes through an `EnvFilter` at the configured level. When a
//! log directory is set, everything at `file_level` and above is also written
//! to a size-rotated file in that directory.

use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Name of the log file inside the log directory.
pub const LOG_FILE_NAME: &str = "shadow-warden.log";
/// Size at which the log file is rotated.
pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
/// Rotated files kept next to the active one.
pub const DEFAULT_MAX_FILES: usize = 3;

/// Errors raised while setting up logging.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Cannot create log directory {path}: {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Console log level.
    pub level: Level,
    /// Level written to the log file.
    pub file_level: Level,
    /// Directory for the rotated log file. `None` logs to the console only.
    pub log_dir: Option<PathBuf>,
    pub max_file_bytes: usize,
    pub max_files: usize,
    /// Whether to include span events on the console.
    pub include_spans: bool,
    /// Whether to include file/line info.
    pub include_location: bool,
    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_level: Level::INFO,
            log_dir: None,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_files: DEFAULT_MAX_FILES,
            include_spans: false,
            include_location: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Creates a development configuration with more verbose console output.
    /// The file keeps its info level.
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            include_location: true,
            ..Self::default()
        }
    }

    /// Adds a rotated log file in `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Full path of the active log file, if file logging is enabled.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.log_dir.as_ref().map(|dir| dir.join(LOG_FILE_NAME))
    }
}

/// Initializes console-only logging at info level.
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LoggingConfig::default())
}

/// Initializes the logging system with the given configuration.
pub fn init_logging_with_config(config: LoggingConfig) -> Result<(), LoggingError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.level));

    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let console_layer = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_target)
        .with_filter(env_filter);

    let file_layer = match config.log_file() {
        Some(path) => {
            let writer = rotating_writer(&path, config.max_file_bytes, config.max_files)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(config.include_target)
                    .with_writer(Mutex::new(writer))
                    .with_filter(LevelFilter::from_level(config.file_level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

/// Crates whose events reach the console when `RUST_LOG` is unset. The
/// binary's own events carry the `shadow_warden` target.
const LOG_TARGETS: &[&str] = &[
    "shadow_warden",
    "sw_core",
    "sw_connectors",
    "sw_observability",
];

/// Console filter used when `RUST_LOG` is unset.
pub fn default_filter(level: Level) -> EnvFilter {
    let directives: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect();
    EnvFilter::new(directives.join(","))
}

/// Opens a size-rotated log file, creating its directory first.
pub fn rotating_writer(
    path: &Path,
    max_file_bytes: usize,
    max_files: usize,
) -> Result<FileRotate<AppendCount>, LoggingError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| LoggingError::LogDirectory {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(FileRotate::new(
        path,
        AppendCount::new(max_files),
        ContentLimit::Bytes(max_file_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}

/// Creates a span for work on one managed cluster.
#[macro_export]
macro_rules! cluster_span {
    ($cluster:expr) => {
        $crate::tracing::info_span!("cluster", cluster = %$cluster)
    };
    ($cluster:expr, $($field:tt)*) => {
        $crate::tracing::info_span!("cluster", cluster = %$cluster, $($field)*)
    };
}

/// Creates a span for work on one device group (or vsys).
#[macro_export]
macro_rules! group_span {
    ($device_group:expr) => {
        $crate::tracing::info_span!("device_group", device_group = %$device_group)
    };
}
