//! External collaborators of the analysis pipeline.
//!
//! The core only depends on the two traits defined here:
//!
//! - [`RemoteJobService`]: discovers, creates and queries cache analysis jobs
//! - [`Publisher`]: uploads exported files and posts the summary comment
//!
//! Concrete adapters live in submodules: [`aliyun`] talks to the DAS and
//! R-KVStore APIs, [`gitlab`] uploads to a GitLab project and comments on an
//! issue.
//!
//! # Example
//!
//! ```rust,ignore
//! use redis_key_analysis::api::{AliyunClient, AliyunConfig, GitLabConfig, GitLabPublisher};
//!
//! let jobs = AliyunClient::new(AliyunConfig::new("key-id", "key-secret"))?;
//! let publisher = GitLabPublisher::new(GitLabConfig::new("https://gitlab.example.com", "token", 42, 7))?;
//! ```

pub mod aliyun;
pub mod gitlab;
pub mod signer;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PublishError, RemoteError};
use crate::scheduler::{AnalysisResult, JobStatus};

pub use aliyun::{decode_analysis_result, AliyunClient, AliyunConfig};
pub use gitlab::{GitLabConfig, GitLabPublisher};

/// Remote service hosting cache analysis jobs.
#[async_trait]
pub trait RemoteJobService: Send + Sync {
    /// Returns the id of a job for `instance_id` started within `window`, if any.
    async fn find_recent_job(
        &self,
        instance_id: &str,
        window: Duration,
    ) -> Result<Option<String>, RemoteError>;

    /// Creates a new analysis job and returns its id.
    ///
    /// Fails with `RemoteError::NoBackup` when no eligible backup set exists.
    async fn create_job(&self, instance_id: &str) -> Result<String, RemoteError>;

    /// Queries the current state of a job.
    async fn job_status(&self, instance_id: &str, job_id: &str) -> Result<JobStatus, RemoteError>;

    /// Fetches and decodes the result tables of a finished job.
    async fn job_result(
        &self,
        instance_id: &str,
        job_id: &str,
    ) -> Result<AnalysisResult, RemoteError>;
}

/// Collaboration platform receiving exported files and the summary.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Uploads a local file and returns a reference to it (a link or file id).
    async fn upload_file(&self, path: &Path) -> Result<String, PublishError>;

    /// Posts a comment.
    async fn post_comment(&self, body: &str) -> Result<(), PublishError>;
}
