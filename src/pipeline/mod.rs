//! Pipeline orchestration for offline Redis key analysis.
//!
//! # Architecture
//!
//! - **Orchestrator**: fans out one task per instance and publishes the summary
//! - **ResultCache**: run-scoped map from `<instance>_<kind>` to file references
//! - **Report**: renders the markdown summary comment
//! - **Config**: YAML configuration for all pipeline components
//!
//! # Pipeline Flow
//!
//! 1. **Job binding**: reuse an analysis job from the last 24 hours or create one
//! 2. **Polling**: query the job state on a fixed interval until it is terminal
//! 3. **Export**: write the top-prefix and top-bigmem tables as CSV files
//! 4. **Upload**: publish each file and record its reference in the cache
//! 5. **Summary**: once every instance is done, post one comment listing all references
//!
//! # Example
//!
//! ```rust,ignore
//! use redis_key_analysis::pipeline::{AppConfig, Orchestrator, OrchestratorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = AppConfig::load("config/config.yaml".as_ref())?;
//! let orchestrator = Orchestrator::new(jobs, publisher, OrchestratorConfig::from(&config));
//!
//! let summary = orchestrator
//!     .run(&config.redis_instances, CancellationToken::new())
//!     .await?;
//! println!("{} succeeded, {} failed", summary.succeeded.len(), summary.failed.len());
//! ```
//!
//! # Failure handling
//!
//! A failing instance never affects the others. Its report line is still
//! rendered, with empty references. The run only fails if the summary
//! comment cannot be posted.

pub mod cache;
pub mod config;
pub mod orchestrator;
pub mod report;

// Re-export main types for convenience
pub use cache::{cache_key, ResultCache};
pub use config::{AppConfig, ConfigError, ReportEntry, DEFAULT_CONFIG_PATH};
pub use orchestrator::{
    InstanceError, Orchestrator, OrchestratorConfig, PipelineError, RunSummary,
};
pub use report::{compose_summary, REPORT_DATE_FORMAT};
