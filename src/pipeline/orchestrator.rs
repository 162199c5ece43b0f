//! Run orchestrator.
//!
//! Fans out one task per Redis instance, waits for all of them, then
//! publishes the summary built from whatever references were recorded. An
//! instance failure is logged and isolated; only a failure to post the
//! summary fails the run.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::cache::ResultCache;
use super::config::{AppConfig, ReportEntry};
use super::report::compose_summary;
use crate::api::{Publisher, RemoteJobService};
use crate::error::{ExportError, JobError, PublishError};
use crate::export::{export_records, ResultKind};
use crate::scheduler::JobPoller;

/// Errors that fail the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The summary comment could not be posted.
    #[error("Failed to publish summary: {0}")]
    Publish(#[from] PublishError),
}

/// Errors that end the processing of a single instance.
#[derive(Debug, Error)]
pub enum InstanceError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Upload failed: {0}")]
    Publish(#[from] PublishError),
}

impl InstanceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InstanceError::Job(e) if e.is_cancelled())
    }
}

/// Settings for one orchestrated run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    /// Directory receiving the CSV exports.
    pub export_dir: PathBuf,
    /// Summary lines, in order.
    pub report_entries: Vec<ReportEntry>,
}

impl OrchestratorConfig {
    pub fn new(poll_interval: Duration, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            poll_interval,
            export_dir: export_dir.into(),
            report_entries: Vec::new(),
        }
    }

    pub fn with_report_entries(mut self, entries: Vec<ReportEntry>) -> Self {
        self.report_entries = entries;
        self
    }
}

impl From<&AppConfig> for OrchestratorConfig {
    fn from(config: &AppConfig) -> Self {
        Self::new(config.poll_interval(), config.export_file_path.clone())
            .with_report_entries(config.report_entries())
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Instances whose tables were all exported and uploaded.
    pub succeeded: Vec<String>,
    /// Instances that failed, were cancelled or panicked.
    pub failed: Vec<String>,
    /// The posted summary comment.
    pub comment: String,
    pub duration: Duration,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.succeeded.len() as f64 / self.total() as f64
        }
    }
}

/// Coordinates analysis, export and publishing across all instances.
pub struct Orchestrator {
    poller: JobPoller,
    publisher: Arc<dyn Publisher>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        service: Arc<dyn RemoteJobService>,
        publisher: Arc<dyn Publisher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            poller: JobPoller::new(service, config.poll_interval),
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Processes every instance concurrently, then posts the summary.
    ///
    /// Cancelling `cancel` stops instances that are still waiting on their
    /// job; the summary is still posted with whatever was recorded.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Publish` if the summary comment cannot be
    /// posted. Per-instance failures are reported in the [`RunSummary`].
    pub async fn run(
        &self,
        instances: &[String],
        cancel: CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        info!(instances = instances.len(), "Redis key analysis starting");

        let cache = ResultCache::new();
        let mut tasks = JoinSet::new();

        for instance_id in instances {
            let task = InstanceTask {
                instance_id: instance_id.clone(),
                poller: self.poller.clone(),
                publisher: Arc::clone(&self.publisher),
                export_dir: self.config.export_dir.clone(),
                cache: cache.clone(),
                cancel: cancel.clone(),
            };
            tasks.spawn(async move {
                let instance_id = task.instance_id.clone();
                let result = task.run().await;
                (instance_id, result)
            });
        }

        let mut summary = RunSummary::default();
        let mut pending: HashSet<&str> = instances.iter().map(String::as_str).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((instance_id, Ok(()))) => {
                    info!(instance_id = %instance_id, "Instance analysis published");
                    pending.remove(instance_id.as_str());
                    summary.succeeded.push(instance_id);
                }
                Ok((instance_id, Err(e))) => {
                    if e.is_cancelled() {
                        warn!(instance_id = %instance_id, "Instance analysis cancelled");
                    } else {
                        error!(instance_id = %instance_id, error = %e, "Instance analysis failed");
                    }
                    pending.remove(instance_id.as_str());
                    summary.failed.push(instance_id);
                }
                Err(e) => {
                    error!(error = %e, "Instance task panicked");
                }
            }
        }

        // Whatever never reported back panicked.
        summary
            .failed
            .extend(pending.into_iter().map(str::to_string));

        let references = cache.snapshot().await;
        let comment = compose_summary(
            Local::now().date_naive(),
            &self.config.report_entries,
            &references,
        );

        self.publisher.post_comment(&comment).await?;

        summary.comment = comment;
        summary.duration = started.elapsed();
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            duration_secs = summary.duration.as_secs(),
            "Redis key analysis completed"
        );
        Ok(summary)
    }
}

/// Everything one instance task owns.
struct InstanceTask {
    instance_id: String,
    poller: JobPoller,
    publisher: Arc<dyn Publisher>,
    export_dir: PathBuf,
    cache: ResultCache,
    cancel: CancellationToken,
}

impl InstanceTask {
    /// Drives the job to completion, then exports, uploads and records each
    /// table in order. Stops at the first failure.
    async fn run(self) -> Result<(), InstanceError> {
        let result = self
            .poller
            .run_to_completion(&self.instance_id, &self.cancel)
            .await?;

        for kind in ResultKind::ALL {
            let path = export_records(
                result.records(kind),
                kind.schema().name,
                &self.export_dir,
                &self.instance_id,
            )?;

            let reference = self.publisher.upload_file(&path).await?;
            info!(
                instance_id = %self.instance_id,
                kind = %kind,
                file = %path.display(),
                "Result table uploaded"
            );

            self.cache.record(&self.instance_id, kind, reference).await;
        }

        Ok(())
    }
}
