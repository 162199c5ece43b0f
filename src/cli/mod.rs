//! Command-line interface for redis-key-analysis.
//!
//! Provides the `run` command for a full analysis and the offline `export`
//! command for saved analysis responses.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
