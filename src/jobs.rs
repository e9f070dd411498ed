//! Background job execution and status tracking.
//!
//! A submitted job runs on its own tokio task, detached from the submitting
//! request. Failures are terminal for the job: they are logged and recorded
//! in the tracker, never propagated back across the submission boundary.

use crate::storage::ImageId;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};
use tracing::{error, info};

/// One unit of asynchronous work: an uploaded image bound to the identifier
/// its derivative will be stored under. Immutable once created.
#[derive(Debug, Clone)]
pub struct ImageJob {
    pub id: ImageId,
    /// Raw uploaded image bytes.
    pub bytes: Vec<u8>,
    /// Opaque product metadata; carried along, never interpreted here.
    pub product: serde_json::Value,
}

impl ImageJob {
    pub fn new(id: ImageId, bytes: Vec<u8>, product: serde_json::Value) -> ImageJob {
        ImageJob { id, bytes, product }
    }
}

/// Processing state of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted but not yet finished.
    Pending,
    /// Finished and its output is retrievable.
    Succeeded,
    /// Finished with an error; no output will ever appear.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether no further transitions are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the tracker knows about one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure message, present once the job has failed.
    pub error: Option<String>,
}

impl JobRecord {
    fn pending() -> JobRecord {
        JobRecord {
            status: JobStatus::Pending,
            submitted_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }
}

/// In-memory map from identifier to job state.
///
/// This is what makes accepted-but-failed jobs observable: retrieval alone
/// cannot distinguish "still processing" from "failed forever", both read as
/// not found. Single-process by design, like the runner itself.
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    inner: Arc<RwLock<HashMap<ImageId, JobRecord>>>,
}

impl JobTracker {
    pub fn new() -> JobTracker {
        JobTracker::default()
    }

    /// Looks up the record for an identifier, if one was ever submitted.
    pub fn get(&self, id: &ImageId) -> Option<JobRecord> {
        self.read().get(id).cloned()
    }

    /// Current status for an identifier, if known.
    pub fn status(&self, id: &ImageId) -> Option<JobStatus> {
        self.get(id).map(|r| r.status)
    }

    fn mark_pending(&self, id: &ImageId) {
        self.write().insert(*id, JobRecord::pending());
    }

    fn mark_succeeded(&self, id: &ImageId) {
        if let Some(record) = self.write().get_mut(id) {
            record.status = JobStatus::Succeeded;
            record.finished_at = Some(Utc::now());
        }
    }

    fn mark_failed(&self, id: &ImageId, message: String) {
        if let Some(record) = self.write().get_mut(id) {
            record.status = JobStatus::Failed;
            record.finished_at = Some(Utc::now());
            record.error = Some(message);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ImageId, JobRecord>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ImageId, JobRecord>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Runs submitted jobs outside the caller's lifecycle.
///
/// Each job gets its own tokio task; there is no ordering between jobs and no
/// guarantee any job has finished by the time the submitter moves on. The
/// runner performs no retries; retries, if wanted, belong inside the work
/// itself.
#[derive(Debug, Clone, Default)]
pub struct JobRunner {
    tracker: JobTracker,
}

impl JobRunner {
    pub fn new() -> JobRunner {
        JobRunner {
            tracker: JobTracker::new(),
        }
    }

    /// The tracker this runner records job outcomes into.
    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Submits a job and returns immediately.
    ///
    /// `work` starts executing without further caller action. Its failure is
    /// logged with the job identifier and recorded in the tracker; nothing is
    /// ever thrown back to the submitter.
    pub fn submit<W, Fut, E>(&self, job: ImageJob, work: W)
    where
        W: FnOnce(ImageJob) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let id = job.id;
        self.tracker.mark_pending(&id);
        info!(image_id = %id, "job submitted");

        let tracker = self.tracker.clone();
        tokio::spawn(async move {
            match work(job).await {
                Ok(()) => {
                    info!(image_id = %id, "job succeeded");
                    tracker.mark_succeeded(&id);
                }
                Err(e) => {
                    error!(image_id = %id, error = %e, "job failed");
                    tracker.mark_failed(&id, e.to_string());
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{ImageJob, JobRunner, JobStatus};
    use crate::storage::ImageId;
    use std::time::Duration;

    fn job() -> ImageJob {
        ImageJob::new(
            ImageId::generate(),
            b"bytes".to_vec(),
            serde_json::json!({ "product_id": "p1" }),
        )
    }

    async fn wait_until_terminal(runner: &JobRunner, id: &ImageId) -> JobStatus {
        for _ in 0..100 {
            if let Some(status) = runner.tracker().status(id) {
                if status.is_terminal() {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_submit_returns_before_work_resolves() {
        let runner = JobRunner::new();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let job = job();
        let id = job.id;

        // The work blocks until we let it through. If submit awaited the
        // work, this call would deadlock instead of returning.
        runner.submit(job, move |_job| async move {
            gate.await.ok();
            Ok::<(), std::convert::Infallible>(())
        });

        assert_eq!(Some(JobStatus::Pending), runner.tracker().status(&id));

        release.send(()).unwrap();
        assert_eq!(JobStatus::Succeeded, wait_until_terminal(&runner, &id).await);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_propagated() {
        let runner = JobRunner::new();
        let job = job();
        let id = job.id;

        runner.submit(job, |_job| async { Err("detector melted") });

        assert_eq!(JobStatus::Failed, wait_until_terminal(&runner, &id).await);

        let record = runner.tracker().get(&id).unwrap();
        assert_eq!(Some("detector melted".to_string()), record.error);
        assert!(record.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_jobs_complete_independently() {
        let runner = JobRunner::new();

        let first = job();
        let second = job();
        let (first_id, second_id) = (first.id, second.id);

        runner.submit(first, |_job| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<(), std::convert::Infallible>(())
        });
        runner.submit(second, |_job| async {
            Ok::<(), std::convert::Infallible>(())
        });

        assert_eq!(JobStatus::Succeeded, wait_until_terminal(&runner, &first_id).await);
        assert_eq!(JobStatus::Succeeded, wait_until_terminal(&runner, &second_id).await);
    }

    #[tokio::test]
    async fn test_unknown_id_has_no_record() {
        let runner = JobRunner::new();
        assert_eq!(None, runner.tracker().get(&ImageId::generate()));
    }
}
