//! In-process job queue: a bounded channel drained by a pool of worker tasks.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{error, warn};
use uuid::Uuid;

use super::{
    compute::run_compute_job,
    context::{JobError, JobWorkerContext},
    dispatch::{DispatchError, Dispatcher, Job, Ticket},
    inspect::run_inspect_image_job,
};

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug)]
struct QueuedJob {
    ticket: Ticket,
    job: Job,
}

/// Enqueue side of the in-process queue.
#[derive(Clone)]
pub struct QueueDispatcher {
    sender: mpsc::Sender<QueuedJob>,
}

/// Worker tasks draining a [`QueueDispatcher`].
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl QueueDispatcher {
    /// Create the queue and spawn `workers` tasks consuming it.
    pub fn spawn(
        context: JobWorkerContext,
        capacity: usize,
        workers: usize,
        max_attempts: u32,
    ) -> (Self, WorkerPool) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let context = context.clone();
                tokio::spawn(async move {
                    worker_loop(worker, receiver, context, max_attempts.max(1)).await;
                })
            })
            .collect();

        (Self { sender }, WorkerPool { handles })
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn enqueue(&self, job: Job) -> Result<Ticket, DispatchError> {
        let ticket = Ticket {
            id: Uuid::new_v4().to_string(),
            job_type: job.job_type(),
        };
        let queued = QueuedJob {
            ticket: ticket.clone(),
            job,
        };

        self.sender.try_send(queued).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })?;

        Ok(ticket)
    }
}

impl WorkerPool {
    pub async fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    context: JobWorkerContext,
    max_attempts: u32,
) {
    loop {
        let next = { receiver.lock().await.recv().await };
        let Some(queued) = next else {
            break;
        };
        run_with_retries(worker, &context, &queued, max_attempts).await;
    }
}

async fn run_with_retries(
    worker: usize,
    context: &JobWorkerContext,
    queued: &QueuedJob,
    max_attempts: u32,
) {
    for attempt in 1..=max_attempts {
        match run_job(context, &queued.job).await {
            Ok(()) => return,
            Err(err) if attempt < max_attempts => {
                warn!(
                    target = "application::jobs::queue",
                    worker,
                    ticket = %queued.ticket.id,
                    job_type = queued.ticket.job_type.as_str(),
                    attempt,
                    error = %err,
                    "Job attempt failed; retrying"
                );
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            Err(err) => {
                error!(
                    target = "application::jobs::queue",
                    worker,
                    ticket = %queued.ticket.id,
                    job_type = queued.ticket.job_type.as_str(),
                    attempts = max_attempts,
                    error = %err,
                    "Job failed permanently"
                );
            }
        }
    }
}

async fn run_job(context: &JobWorkerContext, job: &Job) -> Result<(), JobError> {
    match job {
        Job::Compute(payload) => run_compute_job(context, payload).await,
        Job::InspectImage(payload) => run_inspect_image_job(context, payload).await,
    }
}
