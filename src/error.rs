//! Error types for redis-key-analysis operations.
//!
//! Defines error types for the major subsystems:
//! - Remote analysis job service calls
//! - Publishing to the collaboration platform
//! - CSV export
//! - Job polling and terminal states

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by the remote analysis job service.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}) calling {action}: {message}")]
    ApiError {
        action: String,
        code: String,
        message: String,
    },

    #[error("No backup set found for instance '{instance_id}' in the last 24 hours")]
    NoBackup { instance_id: String },

    #[error("Failed to decode {action} response: {message}")]
    Decode { action: String, message: String },

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Errors returned by the publishing collaborator.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to upload file '{file}': {reason}")]
    UploadFailed { file: String, reason: String },

    #[error("Failed to post comment ({status}): {body}")]
    CommentFailed { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while exporting result tables.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Unknown export schema: {0}")]
    UnknownSchema(String),

    #[error("Failed to create export directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create export file '{}': {source}", path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write row {row} of '{}': {message}", path.display())]
    WriteRow {
        path: PathBuf,
        row: usize,
        message: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a single analysis job's polling loop.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Failed to create analysis job for '{instance_id}': {source}")]
    CreateFailed {
        instance_id: String,
        #[source]
        source: RemoteError,
    },

    #[error("Analysis job {job_id} for '{instance_id}' ended in state {state}: {message}")]
    Terminal {
        instance_id: String,
        job_id: String,
        state: String,
        message: String,
    },

    #[error("Failed to fetch result of job {job_id} for '{instance_id}': {source}")]
    ResultFetch {
        instance_id: String,
        job_id: String,
        #[source]
        source: RemoteError,
    },

    #[error("Polling of '{instance_id}' was cancelled")]
    Cancelled { instance_id: String },
}

impl JobError {
    /// Returns whether this error came from cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled { .. })
    }
}
