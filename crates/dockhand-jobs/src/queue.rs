//! Job submission, dispatch and result polling.
//!
//! [`start`] wires a [`JobStore`] and a [`JobRunner`] together and returns
//! the two halves of the tracker: a cloneable [`JobQueue`] for the request
//! path and the [`WorkerPool`] that owns the background tasks.

use crate::error::{JobError, Result};
use crate::record::{JobId, JobRecord};
use crate::runner::{JobRunner, ShutdownSignal};
use crate::status::JobStatusView;
use crate::store::JobStore;
use chrono::Utc;
use dockhand_core::{ExecutionOutcome, FailedStep, JobDescriptor};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Jobs executed in parallel.
    pub workers: usize,
    /// Jobs that may wait for a worker before submissions are refused.
    pub capacity: usize,
    /// How long terminal records stay queryable.
    pub result_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            capacity: 64,
            result_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

struct QueuedJob {
    id: JobId,
    descriptor: JobDescriptor,
}

/// Submission and query side of the tracker.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    sender: mpsc::Sender<QueuedJob>,
    capacity: usize,
}

/// Background tasks executing queued jobs.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    dispatcher: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

/// Spawn the dispatcher and retention sweeper on the current runtime.
pub fn start(
    store: Arc<dyn JobStore>,
    runner: Arc<dyn JobRunner>,
    options: QueueOptions,
) -> (JobQueue, WorkerPool) {
    let workers = options.workers.max(1);
    let capacity = options.capacity.max(1);
    let (sender, receiver) = mpsc::channel(capacity);
    let (shutdown_tx, shutdown) = ShutdownSignal::channel();

    let dispatcher = tokio::spawn(dispatch(
        receiver,
        Arc::clone(&store),
        runner,
        workers,
        shutdown.clone(),
    ));
    let sweeper = tokio::spawn(sweep(
        Arc::clone(&store),
        options.result_ttl,
        options.sweep_interval,
        shutdown,
    ));

    tracing::info!(
        "Job queue started ({} workers, capacity {})",
        workers,
        capacity
    );

    (
        JobQueue {
            store,
            sender,
            capacity,
        },
        WorkerPool {
            shutdown: shutdown_tx,
            dispatcher,
            sweeper,
        },
    )
}

impl JobQueue {
    /// Record the job as queued and hand it to the dispatcher.
    ///
    /// Never waits for a worker; a full queue is refused immediately.
    pub async fn enqueue(&self, descriptor: JobDescriptor) -> Result<JobId> {
        let id = JobId::new();
        let reference = descriptor.image_reference();
        self.store
            .insert(JobRecord::queued(id, reference.clone()))
            .await?;

        match self.sender.try_send(QueuedJob { id, descriptor }) {
            Ok(()) => {
                tracing::info!(job_id = %id, "Queued {}", reference);
                Ok(id)
            }
            Err(TrySendError::Full(_)) => {
                self.store.remove(&id).await?;
                tracing::warn!("Job queue full, refusing {}", reference);
                Err(JobError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => {
                self.store.remove(&id).await?;
                Err(JobError::Closed)
            }
        }
    }

    /// Current status of a job, in the shape returned to polling clients.
    pub async fn query(&self, id: &JobId) -> Result<JobStatusView> {
        self.record(id).await.map(|record| JobStatusView::from(&record))
    }

    pub async fn record(&self, id: &JobId) -> Result<JobRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| JobError::UnknownJob(id.to_string()))
    }
}

impl WorkerPool {
    /// Stop accepting work, cancel running jobs and wait for them to record
    /// their outcome.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down job workers");
        let _ = self.shutdown.send(true);
        if let Err(e) = self.dispatcher.await {
            tracing::error!("Job dispatcher ended abnormally: {}", e);
        }
        if let Err(e) = self.sweeper.await {
            tracing::error!("Result sweeper ended abnormally: {}", e);
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<QueuedJob>,
    store: Arc<dyn JobStore>,
    runner: Arc<dyn JobRunner>,
    workers: usize,
    shutdown: ShutdownSignal,
) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut in_flight = JoinSet::new();
    let mut stop = shutdown.clone();

    loop {
        let job = tokio::select! {
            biased;
            _ = stop.recv() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = stop.recv() => {
                abandon(store.as_ref(), job).await;
                break;
            }
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        in_flight.spawn(run_job(
            Arc::clone(&store),
            Arc::clone(&runner),
            job,
            shutdown.clone(),
            permit,
        ));

        while in_flight.try_join_next().is_some() {}
    }

    // Jobs still sitting in the channel never reached a worker.
    receiver.close();
    while let Some(job) = receiver.recv().await {
        abandon(store.as_ref(), job).await;
    }

    while in_flight.join_next().await.is_some() {}
    tracing::debug!("Job dispatcher stopped");
}

async fn run_job(
    store: Arc<dyn JobStore>,
    runner: Arc<dyn JobRunner>,
    job: QueuedJob,
    shutdown: ShutdownSignal,
    _permit: OwnedSemaphorePermit,
) {
    let QueuedJob { id, descriptor } = job;
    let reference = descriptor.image_reference();

    match store.mark_running(&id).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(job_id = %id, "Job is no longer queued, skipping");
            return;
        }
        Err(e) => {
            tracing::error!(job_id = %id, "Could not start job: {}", e);
            return;
        }
    }

    tracing::info!(job_id = %id, "Running {}", reference);

    let outcome = match AssertUnwindSafe(runner.run(descriptor, shutdown))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(job_id = %id, "Worker panicked while running {}: {}", reference, message);
            ExecutionOutcome::failed(FailedStep::Build, format!("worker panicked: {}", message))
        }
    };

    match &outcome {
        ExecutionOutcome::Succeeded { registry_url, .. } => {
            tracing::info!(job_id = %id, "Job succeeded: {} ({})", reference, registry_url);
        }
        ExecutionOutcome::Failed { step, message } => {
            tracing::error!(job_id = %id, step = %step, "Job failed: {}: {}", reference, message);
        }
    }

    if let Err(e) = store.finish(&id, outcome).await {
        tracing::error!(job_id = %id, "Could not record job outcome: {}", e);
    }
}

/// Close out a job that was accepted but will never run.
async fn abandon(store: &dyn JobStore, job: QueuedJob) {
    let outcome = ExecutionOutcome::failed(
        FailedStep::Build,
        "cancelled: worker pool shut down before the job started",
    );
    let result = match store.mark_running(&job.id).await {
        Ok(true) => store.finish(&job.id, outcome).await,
        Ok(false) => Ok(()),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::error!(job_id = %job.id, "Could not cancel job: {}", e);
    }
}

async fn sweep(
    store: Arc<dyn JobStore>,
    ttl: Duration,
    interval: Duration,
    mut shutdown: ShutdownSignal,
) {
    let Ok(ttl) = chrono::Duration::from_std(ttl) else {
        tracing::debug!("Result TTL out of range, expiry disabled");
        return;
    };

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }

        let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
            continue;
        };
        match store.purge_finished_before(cutoff).await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!("Expired {} finished jobs", purged),
            Err(e) => tracing::warn!("Failed to expire finished jobs: {}", e),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
