//! Dispatcher capability: hand a job to a worker and return immediately.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::types::JobType;

use super::compute::ComputeJobPayload;
use super::inspect::InspectImageJobPayload;

/// Acknowledgement that a job was accepted. Not a completion signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub id: String,
    pub job_type: JobType,
}

#[derive(Debug, Clone)]
pub enum Job {
    Compute(ComputeJobPayload),
    InspectImage(InspectImageJobPayload),
}

impl Job {
    pub fn job_type(&self) -> JobType {
        match self {
            Job::Compute(_) => JobType::Compute,
            Job::InspectImage(_) => JobType::InspectImage,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("job queue is full")]
    QueueFull,
    #[error("job queue is closed")]
    Closed,
    #[error("job backend error: {0}")]
    Backend(String),
}

impl DispatchError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Enqueue `job` without waiting for it to run.
    async fn enqueue(&self, job: Job) -> Result<Ticket, DispatchError>;
}
