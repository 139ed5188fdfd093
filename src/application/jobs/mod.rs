mod compute;
mod context;
mod dispatch;
mod inspect;
mod queue;
mod sweep;

pub use compute::{
    ComputeError, ComputeJobPayload, Computation, EchoComputation, process_compute_job,
    run_compute_job,
};
pub use context::{JobError, JobWorkerContext, job_failed};
pub use dispatch::{DispatchError, Dispatcher, Job, Ticket};
pub use inspect::{InspectImageJobPayload, process_inspect_image_job, run_inspect_image_job};
pub use queue::{QueueDispatcher, WorkerPool};
pub use sweep::{
    SweepPendingContext, SweepPendingJob, process_sweep_pending_job, sweep_schedule,
};

pub(crate) use compute::{METRIC_COMPUTE_COMPLETED, METRIC_COMPUTE_FAILED, METRIC_COMPUTE_MS};
pub(crate) use sweep::METRIC_PENDING_PURGED;
