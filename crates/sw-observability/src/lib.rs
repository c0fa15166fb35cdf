//! # sw-observability
//!
//! Logging infrastructure for Shadow Warden: console and rotated-file
//! `tracing` output plus span helpers shared by the other crates.

pub mod logging;

pub use logging::{init_logging, init_logging_with_config, LoggingConfig, LoggingError};

#[doc(hidden)]
pub use tracing;
