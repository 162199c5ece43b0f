//! Analysis job scheduling.
//!
//! This module drives a single remote cache analysis job from discovery or
//! creation to a terminal state:
//!
//! - **AnalysisJob**: the job being driven, with its bound id and last state
//! - **JobPoller**: the polling state machine
//! - **AnalysisResult**: the decoded result tables of a finished job
//!
//! # Example
//!
//! ```rust,ignore
//! use redis_key_analysis::scheduler::JobPoller;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! let poller = JobPoller::new(service, Duration::from_secs(60));
//! let result = poller.run_to_completion("r-bp1abc", &CancellationToken::new()).await?;
//! ```
//!
//! # Semantics
//!
//! - **Reuse**: a job started within the last 24 hours is reused instead of
//!   creating a new one
//! - **Polling**: status is queried once per interval, with no attempt limit
//! - **Terminal states**: `FINISHED` fetches the result once; `FAILED` and
//!   `ERROR` end the job without retry
//! - **Cancellation**: a cancelled token ends the wait for the next tick

pub mod job;
pub mod poller;

// Re-export main types for convenience
pub use job::{AnalysisJob, AnalysisResult, JobState, JobStatus, RECENT_JOB_WINDOW};
pub use poller::{JobPoller, DEFAULT_POLL_INTERVAL};
