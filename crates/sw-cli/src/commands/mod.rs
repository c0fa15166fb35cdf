//! Subcommand implementations.

pub mod run;

pub use run::{run_poller, RunMode};
