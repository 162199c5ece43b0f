//! Polling state machine for a single analysis job.
//!
//! [`JobPoller::run_to_completion`] binds a job for an instance (reusing one
//! started within the last 24 hours, or creating a new one), then polls its
//! status on a fixed interval until a terminal state is reached or the shared
//! cancellation token fires.
//!
//! ```text
//! PENDING ──bind──▶ BACKUP ──▶ ANALYZING ──▶ FINISHED ─▶ fetch result
//!                      │            │
//!                      └────────────┴──────▶ FAILED | ERROR
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::job::{AnalysisJob, AnalysisResult, JobState, JobStatus, RECENT_JOB_WINDOW};
use crate::api::RemoteJobService;
use crate::error::JobError;

/// Interval used when the configured one is zero.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Drives analysis jobs through the remote service until they finish.
#[derive(Clone)]
pub struct JobPoller {
    service: Arc<dyn RemoteJobService>,
    interval: Duration,
}

impl JobPoller {
    /// Creates a poller. A zero `interval` falls back to
    /// [`DEFAULT_POLL_INTERVAL`].
    pub fn new(service: Arc<dyn RemoteJobService>, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            warn!(
                default_secs = DEFAULT_POLL_INTERVAL.as_secs(),
                "Poll interval is invalid, using default"
            );
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };

        Self { service, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs the analysis job for `instance_id` to a terminal state.
    ///
    /// The first status query happens one interval after the job is bound.
    /// There is no attempt limit; only `cancel` stops a job that never
    /// finishes.
    ///
    /// # Errors
    ///
    /// - `JobError::CreateFailed` if no job could be created
    /// - `JobError::Terminal` if the job ends `FAILED` or `ERROR`, or its
    ///   status cannot be queried
    /// - `JobError::ResultFetch` if the finished job's result cannot be read
    /// - `JobError::Cancelled` if `cancel` fires while waiting for a tick
    pub async fn run_to_completion(
        &self,
        instance_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, JobError> {
        let mut job = AnalysisJob::new(instance_id);
        self.bind_job(&mut job).await?;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // skip the immediate first tick

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(
                        instance_id = %job.instance_id,
                        job_id = %job.job_id,
                        state = %job.state,
                        reused = job.reused,
                        "Polling cancelled"
                    );
                    return Err(JobError::Cancelled {
                        instance_id: job.instance_id.clone(),
                    });
                }
                _ = ticker.tick() => {}
            }

            let status = self.poll_status(&job).await;
            if job.observe(status.state.clone()) {
                info!(
                    instance_id = %job.instance_id,
                    job_id = %job.job_id,
                    state = %job.state,
                    "Analysis job state changed"
                );
            }

            match &status.state {
                JobState::Finished => {
                    info!(
                        instance_id = %job.instance_id,
                        job_id = %job.job_id,
                        reused = job.reused,
                        elapsed_secs = job.age().num_seconds(),
                        "Analysis job finished"
                    );
                    return self
                        .service
                        .job_result(&job.instance_id, &job.job_id)
                        .await
                        .map_err(|source| JobError::ResultFetch {
                            instance_id: job.instance_id.clone(),
                            job_id: job.job_id.clone(),
                            source,
                        });
                }
                state if state.is_failure() => {
                    let message = status.message.unwrap_or_default();
                    error!(
                        instance_id = %job.instance_id,
                        job_id = %job.job_id,
                        state = %job.state,
                        reused = job.reused,
                        message = %message,
                        "Analysis job failed"
                    );
                    return Err(JobError::Terminal {
                        instance_id: job.instance_id.clone(),
                        job_id: job.job_id.clone(),
                        state: job.state.to_string(),
                        message,
                    });
                }
                JobState::Unknown(raw) => {
                    warn!(
                        instance_id = %job.instance_id,
                        state = %raw,
                        "Unrecognized analysis job state, waiting"
                    );
                }
                _ => {
                    warn!(
                        instance_id = %job.instance_id,
                        state = %job.state,
                        "Analysis job is not completed, waiting"
                    );
                }
            }
        }
    }

    /// Reuses a recent job if the remote knows one, otherwise creates a job.
    async fn bind_job(&self, job: &mut AnalysisJob) -> Result<(), JobError> {
        match self
            .service
            .find_recent_job(&job.instance_id, RECENT_JOB_WINDOW)
            .await
        {
            Ok(Some(job_id)) => {
                info!(instance_id = %job.instance_id, job_id = %job_id, "Reusing recent analysis job");
                job.bind(job_id, true);
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    instance_id = %job.instance_id,
                    error = %e,
                    "Failed to list recent analysis jobs, creating a new one"
                );
            }
        }

        let job_id = self
            .service
            .create_job(&job.instance_id)
            .await
            .map_err(|source| {
                error!(instance_id = %job.instance_id, error = %source, "Failed to create analysis job");
                JobError::CreateFailed {
                    instance_id: job.instance_id.clone(),
                    source,
                }
            })?;

        info!(instance_id = %job.instance_id, job_id = %job_id, "Analysis job created");
        job.bind(job_id, false);
        Ok(())
    }

    /// Queries the job state. A failed query counts as `ERROR`.
    async fn poll_status(&self, job: &AnalysisJob) -> JobStatus {
        match self.service.job_status(&job.instance_id, &job.job_id).await {
            Ok(status) => status,
            Err(e) => {
                error!(
                    instance_id = %job.instance_id,
                    job_id = %job.job_id,
                    error = %e,
                    "Failed to query analysis job status"
                );
                JobStatus::new(JobState::Error).with_message(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted remote service for testing.
    #[derive(Default)]
    struct MockJobService {
        recent: Option<String>,
        recent_fails: bool,
        create_fails: bool,
        states: Mutex<VecDeque<Result<JobStatus, String>>>,
        created: AtomicUsize,
        status_calls: AtomicUsize,
        result_calls: AtomicUsize,
        lookup_windows: Mutex<Vec<Duration>>,
    }

    impl MockJobService {
        fn with_states(states: Vec<JobState>) -> Self {
            Self {
                states: Mutex::new(states.into_iter().map(|s| Ok(JobStatus::new(s))).collect()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl RemoteJobService for MockJobService {
        async fn find_recent_job(
            &self,
            _instance_id: &str,
            window: Duration,
        ) -> Result<Option<String>, RemoteError> {
            self.lookup_windows.lock().expect("lock poisoned").push(window);
            if self.recent_fails {
                return Err(RemoteError::RequestFailed("list unavailable".to_string()));
            }
            Ok(self.recent.clone())
        }

        async fn create_job(&self, instance_id: &str) -> Result<String, RemoteError> {
            if self.create_fails {
                return Err(RemoteError::NoBackup {
                    instance_id: instance_id.to_string(),
                });
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok("job-new".to_string())
        }

        async fn job_status(
            &self,
            _instance_id: &str,
            _job_id: &str,
        ) -> Result<JobStatus, RemoteError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.states.lock().expect("lock poisoned").pop_front();
            match next {
                Some(Ok(status)) => Ok(status),
                Some(Err(message)) => Err(RemoteError::RequestFailed(message)),
                None => Ok(JobStatus::new(JobState::Analyzing)),
            }
        }

        async fn job_result(
            &self,
            _instance_id: &str,
            _job_id: &str,
        ) -> Result<AnalysisResult, RemoteError> {
            self.result_calls.fetch_add(1, Ordering::SeqCst);
            let prefix = json!({"Prefix": "a:*", "Bytes": 1024}).as_object().cloned().unwrap();
            Ok(AnalysisResult::new(Some(vec![prefix]), Some(Vec::new())))
        }
    }

    fn poller(service: Arc<MockJobService>) -> JobPoller {
        JobPoller::new(service, Duration::from_millis(5))
    }

    #[test]
    fn test_zero_interval_falls_back_to_default() {
        let service = Arc::new(MockJobService::default());
        let poller = JobPoller::new(service, Duration::ZERO);
        assert_eq!(poller.interval(), DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn test_finishes_after_analyzing() {
        let service = Arc::new(MockJobService::with_states(vec![
            JobState::Backup,
            JobState::Analyzing,
            JobState::Analyzing,
            JobState::Finished,
        ]));

        let result = poller(service.clone())
            .run_to_completion("r-abc", &CancellationToken::new())
            .await
            .expect("job should finish");

        assert_eq!(result.prefix_records.as_ref().map(Vec::len), Some(1));
        assert_eq!(service.created.load(Ordering::SeqCst), 1);
        assert_eq!(service.status_calls.load(Ordering::SeqCst), 4);
        assert_eq!(service.result_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reuses_recent_job() {
        let service = Arc::new(MockJobService {
            recent: Some("job-old".to_string()),
            ..MockJobService::with_states(vec![JobState::Finished])
        });

        poller(service.clone())
            .run_to_completion("r-abc", &CancellationToken::new())
            .await
            .expect("job should finish");

        assert_eq!(service.created.load(Ordering::SeqCst), 0);
        assert_eq!(service.result_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *service.lookup_windows.lock().unwrap(),
            vec![RECENT_JOB_WINDOW]
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_creates_job() {
        let service = Arc::new(MockJobService {
            recent_fails: true,
            ..MockJobService::with_states(vec![JobState::Finished])
        });

        poller(service.clone())
            .run_to_completion("r-abc", &CancellationToken::new())
            .await
            .expect("job should finish");

        assert_eq!(service.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_failure_aborts() {
        let service = Arc::new(MockJobService {
            create_fails: true,
            ..Default::default()
        });

        let err = poller(service.clone())
            .run_to_completion("r-abc", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            JobError::CreateFailed { source: RemoteError::NoBackup { .. }, .. }
        ));
        assert_eq!(service.status_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_state_is_terminal() {
        let service = Arc::new(MockJobService {
            states: Mutex::new(VecDeque::from(vec![
                Ok(JobStatus::new(JobState::Analyzing)),
                Ok(JobStatus::new(JobState::Failed).with_message("backup expired")),
                Ok(JobStatus::new(JobState::Finished)),
            ])),
            ..Default::default()
        });

        let err = poller(service.clone())
            .run_to_completion("r-abc", &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            JobError::Terminal { state, message, .. } => {
                assert_eq!(state, "FAILED");
                assert_eq!(message, "backup expired");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(service.status_calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.result_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_status_query_failure_counts_as_error() {
        let service = Arc::new(MockJobService {
            states: Mutex::new(VecDeque::from(vec![Err("timeout".to_string())])),
            ..Default::default()
        });

        let err = poller(service.clone())
            .run_to_completion("r-abc", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Terminal { ref state, .. } if state == "ERROR"));
    }

    #[tokio::test]
    async fn test_unknown_state_keeps_polling() {
        let service = Arc::new(MockJobService::with_states(vec![
            JobState::Unknown("QUEUED".to_string()),
            JobState::Finished,
        ]));

        poller(service.clone())
            .run_to_completion("r-abc", &CancellationToken::new())
            .await
            .expect("job should finish");

        assert_eq!(service.status_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_between_ticks() {
        let service = Arc::new(MockJobService::with_states(vec![]));
        let poller = JobPoller::new(service.clone(), Duration::from_secs(3600));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            poller.run_to_completion("r-abc", &cancel),
        )
        .await
        .expect("cancellation should be prompt")
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(service.status_calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.result_calls.load(Ordering::SeqCst), 0);
    }
}
