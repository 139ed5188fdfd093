use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::application::jobs::{DispatchError, Dispatcher, Job, Ticket};

use super::PostgresRepositories;

const DEFAULT_PRIORITY: i32 = 0;

/// Pushes jobs onto the apalis Postgres queue, where `worker` processes pick them up.
#[derive(Clone)]
pub struct PostgresDispatcher {
    repositories: Arc<PostgresRepositories>,
    max_attempts: i32,
}

impl PostgresDispatcher {
    pub fn new(repositories: Arc<PostgresRepositories>, max_attempts: u32) -> Self {
        Self {
            repositories,
            max_attempts: i32::try_from(max_attempts).unwrap_or(i32::MAX),
        }
    }
}

fn encode_payload(job: &Job) -> Result<JsonValue, DispatchError> {
    let encoded = match job {
        Job::Compute(payload) => serde_json::to_value(payload),
        Job::InspectImage(payload) => serde_json::to_value(payload),
    };
    encoded.map_err(DispatchError::backend)
}

#[async_trait]
impl Dispatcher for PostgresDispatcher {
    async fn enqueue(&self, job: Job) -> Result<Ticket, DispatchError> {
        let job_type = job.job_type();
        let payload = encode_payload(&job)?;

        let id: String =
            sqlx::query_scalar("SELECT (apalis.push_job($1, $2::json, $3, $4, $5, $6)).id")
                .bind(job_type.as_str())
                .bind(payload)
                .bind("Pending")
                .bind(OffsetDateTime::now_utc())
                .bind(self.max_attempts)
                .bind(DEFAULT_PRIORITY)
                .fetch_one(self.repositories.pool())
                .await
                .map_err(DispatchError::backend)?;

        Ok(Ticket { id, job_type })
    }
}
