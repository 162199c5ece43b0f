//! redis-key-analysis: offline Redis key distribution reports.
//!
//! This library drives vendor-hosted cache analysis jobs for a set of Redis
//! instances, renders the top-prefix and big-key statistics into CSV tables,
//! publishes them and posts a consolidated summary.

pub mod api;
pub mod cli;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod scheduler;
pub mod utils;

// Re-export commonly used error types
pub use error::{ExportError, JobError, PublishError, RemoteError};
