//! Job definitions for the analysis scheduler.
//!
//! This module defines the core job types used while driving a remote cache
//! analysis:
//!
//! - `AnalysisJob`: one in-flight or completed remote analysis task
//! - `JobState`: the remote task state
//! - `JobStatus`: a status poll answer (state plus optional message)
//! - `AnalysisResult`: the decoded tables of a finished job

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::export::{Record, ResultKind};

/// How far back an existing analysis job is reused instead of creating one.
pub const RECENT_JOB_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// State of a remote cache analysis job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobState {
    /// No job bound yet.
    Pending,
    /// The remote service is preparing the backup set.
    Backup,
    /// The remote service is analyzing the backup.
    Analyzing,
    /// Analysis finished and results are available.
    Finished,
    /// The job failed remotely.
    Failed,
    /// The job errored remotely, or its status could not be queried.
    Error,
    /// A state string this crate does not know about.
    Unknown(String),
}

impl JobState {
    /// Parses a state as reported by the remote service (case-insensitive).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => JobState::Pending,
            "BACKUP" => JobState::Backup,
            "ANALYZING" => JobState::Analyzing,
            "FINISHED" => JobState::Finished,
            "FAILED" => JobState::Failed,
            "ERROR" => JobState::Error,
            _ => JobState::Unknown(raw.trim().to_string()),
        }
    }

    /// Returns whether this terminal state means the job did not produce results.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobState::Failed | JobState::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Backup => "BACKUP",
            JobState::Analyzing => "ANALYZING",
            JobState::Finished => "FINISHED",
            JobState::Failed => "FAILED",
            JobState::Error => "ERROR",
            JobState::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to a single status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    /// Free-form message from the remote service, usually set on failure.
    pub message: Option<String>,
}

impl JobStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A remote analysis job for one Redis instance.
///
/// Created in `Pending` when processing of the instance begins. The job id is
/// bound once, either to a recently started job or to a newly created one, and
/// the state only ever moves as polls report it. The remote service stays the
/// source of truth; nothing here is persisted.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub instance_id: String,
    /// Empty until bound.
    pub job_id: String,
    pub state: JobState,
    /// Whether the job id came from an existing recent job.
    pub reused: bool,
    pub started_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            job_id: String::new(),
            state: JobState::Pending,
            reused: false,
            started_at: Utc::now(),
        }
    }

    /// Binds the remote job id.
    pub fn bind(&mut self, job_id: impl Into<String>, reused: bool) {
        self.job_id = job_id.into();
        self.reused = reused;
    }

    /// Records a polled state. Returns whether the state changed.
    pub fn observe(&mut self, state: JobState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        true
    }

    /// Returns how long ago processing of this job started.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// Decoded result tables of a finished analysis job.
///
/// Either table may be absent (`None`) when the remote service returned no
/// list for it, which is distinct from an empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub prefix_records: Option<Vec<Record>>,
    pub big_key_records: Option<Vec<Record>>,
}

impl AnalysisResult {
    pub fn new(prefix_records: Option<Vec<Record>>, big_key_records: Option<Vec<Record>>) -> Self {
        Self {
            prefix_records,
            big_key_records,
        }
    }

    /// Returns the table for `kind`, if one was provided.
    pub fn records(&self, kind: ResultKind) -> Option<&[Record]> {
        match kind {
            ResultKind::TopPrefix => self.prefix_records.as_deref(),
            ResultKind::TopBigMem => self.big_key_records.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_state_parse() {
        assert_eq!(JobState::parse("BACKUP"), JobState::Backup);
        assert_eq!(JobState::parse("analyzing"), JobState::Analyzing);
        assert_eq!(JobState::parse(" FINISHED "), JobState::Finished);
        assert_eq!(JobState::parse("FAILED"), JobState::Failed);
        assert_eq!(JobState::parse("ERROR"), JobState::Error);
        assert_eq!(
            JobState::parse("QUEUED"),
            JobState::Unknown("QUEUED".to_string())
        );
    }

    #[test]
    fn test_job_state_failure() {
        assert!(!JobState::Pending.is_failure());
        assert!(!JobState::Analyzing.is_failure());
        assert!(!JobState::Unknown("QUEUED".to_string()).is_failure());
        assert!(!JobState::Finished.is_failure());
        assert!(JobState::Failed.is_failure());
        assert!(JobState::Error.is_failure());
    }

    #[test]
    fn test_job_state_display() {
        assert_eq!(format!("{}", JobState::Analyzing), "ANALYZING");
        assert_eq!(format!("{}", JobState::Unknown("Queued".to_string())), "Queued");
    }

    #[test]
    fn test_analysis_job_lifecycle() {
        let mut job = AnalysisJob::new("r-abc");
        assert_eq!(job.state, JobState::Pending);
        assert!(job.job_id.is_empty());
        assert!(!job.reused);

        job.bind("job-1", true);
        assert_eq!(job.job_id, "job-1");
        assert!(job.reused);

        assert!(job.observe(JobState::Analyzing));
        assert!(!job.observe(JobState::Analyzing));

        assert!(job.observe(JobState::Finished));
        assert_eq!(job.state, JobState::Finished);
    }

    #[test]
    fn test_job_status_builder() {
        let status = JobStatus::new(JobState::Failed).with_message("no backup");
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.message.as_deref(), Some("no backup"));
    }

    #[test]
    fn test_analysis_result_records_by_kind() {
        let prefix = json!({"Prefix": "a:*"}).as_object().cloned().unwrap();
        let result = AnalysisResult::new(Some(vec![prefix]), None);

        assert_eq!(result.records(ResultKind::TopPrefix).map(<[_]>::len), Some(1));
        assert!(result.records(ResultKind::TopBigMem).is_none());
    }
}
