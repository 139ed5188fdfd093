//! Compute jobs: run the configured computation and write the result into the cache.

use std::time::{Duration, Instant};

use apalis::prelude::{Data, Error as ApalisError};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::context::{JobError, JobWorkerContext, job_failed};

pub(crate) const METRIC_COMPUTE_COMPLETED: &str = "itemforge_compute_completed_total";
pub(crate) const METRIC_COMPUTE_FAILED: &str = "itemforge_compute_failed_total";
pub(crate) const METRIC_COMPUTE_MS: &str = "itemforge_compute_ms";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeJobPayload {
    pub key: String,
    pub input: String,
}

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("computation for `{key}` failed: {message}")]
    Failed { key: String, message: String },
}

/// The out-of-band work whose result ends up in the cache.
#[async_trait]
pub trait Computation: Send + Sync {
    async fn compute(&self, key: &str, input: &str) -> Result<String, ComputeError>;
}

/// Returns the submitted input unchanged, optionally after a simulated delay.
#[derive(Debug, Clone, Default)]
pub struct EchoComputation {
    delay: Duration,
}

impl EchoComputation {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Computation for EchoComputation {
    async fn compute(&self, _key: &str, input: &str) -> Result<String, ComputeError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(input.to_string())
    }
}

/// Execute one compute attempt. The key stays pending when this fails.
pub async fn run_compute_job(
    ctx: &JobWorkerContext,
    payload: &ComputeJobPayload,
) -> Result<(), JobError> {
    let started_at = Instant::now();

    let result = match ctx.computation.compute(&payload.key, &payload.input).await {
        Ok(result) => result,
        Err(err) => {
            counter!(METRIC_COMPUTE_FAILED).increment(1);
            warn!(
                target = "application::jobs::compute",
                op = "compute",
                result = "error",
                key = %payload.key,
                error = %err,
                "Computation failed; key remains pending"
            );
            return Err(err.into());
        }
    };

    if let Err(err) = ctx.cache.put(&payload.key, &result).await {
        counter!(METRIC_COMPUTE_FAILED).increment(1);
        warn!(
            target = "application::jobs::compute",
            op = "cache_put",
            result = "error",
            key = %payload.key,
            error = %err,
            "Failed to store computed value"
        );
        return Err(err.into());
    }

    let elapsed = started_at.elapsed();
    counter!(METRIC_COMPUTE_COMPLETED).increment(1);
    histogram!(METRIC_COMPUTE_MS).record(elapsed.as_secs_f64() * 1000.0);
    info!(
        target = "application::jobs::compute",
        op = "compute",
        result = "ok",
        key = %payload.key,
        elapsed_ms = elapsed.as_millis() as u64,
        "Computed value stored"
    );
    Ok(())
}

pub async fn process_compute_job(
    payload: ComputeJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    run_compute_job(&context, &payload).await.map_err(job_failed)
}
