//! Background dispatch of provider operations.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::job::{JobId, JobRequest};
use crate::retry::RetryPolicy;
use crate::state::{JobRecord, JobTracker};
use worldsync_common::{BackupName, Error, InstanceName, Result};
use worldsync_storage::{ProviderRegistry, SettingsDescriptor, SyncProvider};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of submitted jobs that may wait for the dispatcher loop.
    pub queue_capacity: usize,
    /// Retry policy applied to every job.
    pub retry: RetryPolicy,
    /// Finished job records kept for `status`/`jobs`; older ones are dropped.
    pub keep_finished: usize,
}

impl DispatchConfig {
    /// Set queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set how many finished job records are kept.
    pub fn with_keep_finished(mut self, keep: usize) -> Self {
        self.keep_finished = keep;
        self
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            retry: RetryPolicy::default(),
            keep_finished: 256,
        }
    }
}

/// A job accepted for execution.
struct Job {
    id: JobId,
    request: JobRequest,
    provider: Arc<dyn SyncProvider>,
    respond: oneshot::Sender<Result<()>>,
}

enum Message {
    Job(Job),
    Shutdown,
}

/// Handle to a submitted job.
pub struct JobTicket {
    id: JobId,
    result_rx: oneshot::Receiver<Result<()>>,
}

impl JobTicket {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the job to finish and return its outcome.
    pub async fn wait(self) -> Result<()> {
        self.result_rx
            .await
            .map_err(|_| Error::Dispatcher(format!("Job {} was dropped", self.id)))?
    }
}

/// Front end for submitting provider operations to run in the background.
///
/// Backup, restore and delete never run on the submitting task; each job
/// gets its own tokio task once the dispatcher loop picks it up. Queries
/// (`backups_for_instance`, `settings`) go straight to the provider.
pub struct SyncDispatcher {
    registry: Arc<ProviderRegistry>,
    tracker: Arc<JobTracker>,
    request_tx: mpsc::Sender<Message>,
    shutdown: AtomicBool,
}

impl SyncDispatcher {
    /// Create a dispatcher over `registry`.
    ///
    /// The returned handle must be run (usually via `tokio::spawn`) for
    /// jobs to make progress.
    pub fn new(registry: Arc<ProviderRegistry>, config: DispatchConfig) -> (Self, DispatcherHandle) {
        let (request_tx, request_rx) = mpsc::channel(config.queue_capacity.max(1));
        let tracker = Arc::new(JobTracker::new());

        let dispatcher = Self {
            registry,
            tracker: tracker.clone(),
            request_tx,
            shutdown: AtomicBool::new(false),
        };

        let handle = DispatcherHandle {
            tracker,
            config: Arc::new(config),
            request_rx,
        };

        (dispatcher, handle)
    }

    /// The registry jobs are resolved against.
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Submit a job.
    ///
    /// # Errors
    /// - `NotFound` if the provider is not registered
    /// - `Dispatcher` if the dispatcher is shut down
    pub async fn submit(&self, request: JobRequest) -> Result<JobTicket> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(Error::Dispatcher("Dispatcher is shut down".to_string()));
        }

        let provider = self.registry.resolve(request.provider())?;
        let id = JobId::generate();
        self.tracker.insert(JobRecord::queued(id, &request)).await;
        debug!("Queued {} job {} on {}", request.kind(), id, request.provider());

        let (respond, result_rx) = oneshot::channel();
        let job = Job {
            id,
            request,
            provider,
            respond,
        };

        if self.request_tx.send(Message::Job(job)).await.is_err() {
            self.tracker
                .update(id, |r| r.mark_failed("Dispatcher not running"))
                .await;
            return Err(Error::Dispatcher("Dispatcher not running".to_string()));
        }

        Ok(JobTicket { id, result_rx })
    }

    /// Submit a job and wait for its outcome.
    pub async fn run(&self, request: JobRequest) -> Result<()> {
        self.submit(request).await?.wait().await
    }

    /// List backups of `instance` held by `provider`.
    pub async fn backups_for_instance(
        &self,
        provider: &str,
        instance: &InstanceName,
    ) -> Result<Vec<BackupName>> {
        self.registry
            .resolve(provider)?
            .backups_for_instance(instance)
            .await
    }

    /// Settings descriptor of `provider`.
    pub fn settings(&self, provider: &str) -> Result<SettingsDescriptor> {
        Ok(self.registry.resolve(provider)?.settings())
    }

    /// Current record of a job.
    pub async fn status(&self, id: JobId) -> Option<JobRecord> {
        self.tracker.get(id).await
    }

    /// Job records still retained, oldest first.
    pub async fn jobs(&self) -> Vec<JobRecord> {
        self.tracker.list().await
    }

    /// Stop accepting jobs and ask the loop to finish.
    ///
    /// Jobs submitted before this call still run to completion.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.request_tx.send(Message::Shutdown).await;
    }
}

/// Handle for the dispatcher background task.
pub struct DispatcherHandle {
    tracker: Arc<JobTracker>,
    config: Arc<DispatchConfig>,
    request_rx: mpsc::Receiver<Message>,
}

impl DispatcherHandle {
    /// Run the dispatcher loop until shutdown or until every
    /// [`SyncDispatcher`] is dropped, then wait for in-flight jobs.
    pub async fn run(mut self) {
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        info!("Sync dispatcher started");

        while let Some(message) = self.request_rx.recv().await {
            match message {
                Message::Shutdown => {
                    info!("Received shutdown request");
                    break;
                }
                Message::Job(job) => {
                    in_flight.retain(|handle| !handle.is_finished());
                    in_flight.push(self.spawn(job));
                }
            }
        }

        // Anything still queued behind the shutdown request is a race with
        // `submit`; run it rather than drop it.
        self.request_rx.close();
        while let Ok(message) = self.request_rx.try_recv() {
            if let Message::Job(job) = message {
                in_flight.push(self.spawn(job));
            }
        }

        futures::future::join_all(in_flight).await;
        info!("Sync dispatcher stopped");
    }

    fn spawn(&self, job: Job) -> JoinHandle<()> {
        tokio::spawn(execute_job(job, self.tracker.clone(), self.config.clone()))
    }
}

async fn execute_job(job: Job, tracker: Arc<JobTracker>, config: Arc<DispatchConfig>) {
    let Job {
        id,
        request,
        provider,
        respond,
    } = job;

    tracker.update(id, |r| r.mark_running()).await;
    debug!(
        "Running {} job {} ({}/{}) on {}",
        request.kind(),
        id,
        request.instance_name(),
        request.backup(),
        provider.name()
    );

    let label = format!("{} job {}", request.kind(), id);
    let attempt = config
        .retry
        .run(&label, || request.execute(provider.as_ref()));
    // A panicking provider fails its job instead of taking the task down.
    let result = match AssertUnwindSafe(attempt).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(Error::Provider(format!(
            "Provider '{}' panicked: {}",
            provider.name(),
            panic_message(panic.as_ref())
        ))),
    };

    match &result {
        Ok(()) => {
            info!("{} job {} completed", request.kind(), id);
            tracker.update(id, |r| r.mark_completed()).await;
        }
        Err(e) => {
            error!("{} job {} failed: {}", request.kind(), id, e);
            let message = e.to_string();
            tracker.update(id, |r| r.mark_failed(message)).await;
        }
    }

    let pruned = tracker.prune_finished(config.keep_finished).await;
    if pruned > 0 {
        debug!("Pruned {} finished job records", pruned);
    }

    let _ = respond.send(result);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
