//! Job state tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::job::{JobId, JobKind, JobRequest};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Accepted, waiting for the dispatcher.
    Queued,
    /// Executing on a worker task.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl JobStatus {
    /// Whether the job has finished either way.
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Tracking record for a single job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub kind: JobKind,
    pub provider: String,
    pub instance: String,
    pub backup: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Error message if failed.
    pub error: Option<String>,
}

impl JobRecord {
    /// Create a queued record for a request.
    pub fn queued(id: JobId, request: &JobRequest) -> Self {
        Self {
            id,
            kind: request.kind(),
            provider: request.provider().to_string(),
            instance: request.instance_name().to_string(),
            backup: request.backup().to_string(),
            status: JobStatus::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Mark as running.
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark as completed successfully.
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.error = None;
    }

    /// Mark as failed.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
    }
}

/// Shared table of job records.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new job.
    pub async fn insert(&self, record: JobRecord) {
        self.jobs.write().await.insert(record.id, record);
    }

    /// Get a copy of a job's record.
    pub async fn get(&self, id: JobId) -> Option<JobRecord> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Apply `f` to a job's record if it exists.
    pub async fn update<F>(&self, id: JobId, f: F)
    where
        F: FnOnce(&mut JobRecord),
    {
        if let Some(record) = self.jobs.write().await.get_mut(&id) {
            f(record);
        }
    }

    /// All records, oldest submission first.
    pub async fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self.jobs.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.submitted_at);
        records
    }

    /// Number of jobs not yet finished.
    pub async fn active_count(&self) -> usize {
        self.jobs
            .read()
            .await
            .values()
            .filter(|r| !r.status.is_finished())
            .count()
    }

    /// Drop finished records beyond the `keep` most recently finished.
    /// Unfinished jobs are never dropped. Returns how many were removed.
    pub async fn prune_finished(&self, keep: usize) -> usize {
        let mut jobs = self.jobs.write().await;
        let mut finished: Vec<(JobId, Option<DateTime<Utc>>)> = jobs
            .values()
            .filter(|r| r.status.is_finished())
            .map(|r| (r.id, r.finished_at))
            .collect();
        if finished.len() <= keep {
            return 0;
        }

        finished.sort_by(|a, b| b.1.cmp(&a.1));
        let stale = finished.split_off(keep);
        for (id, _) in &stale {
            jobs.remove(id);
        }
        stale.len()
    }
}
