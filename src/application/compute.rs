//! Compute-then-cache protocol as seen by clients.
//!
//! `request_compute` marks the key pending and hands the work to a
//! [`Dispatcher`]; clients then poll [`ComputeService::lookup`] until the
//! entry turns ready. Polling is the only completion signal.

use std::{sync::Arc, time::Duration};

use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::{
    application::{
        jobs::{ComputeJobPayload, DispatchError, Dispatcher, Job, Ticket},
        repos::{CacheStore, CacheStoreError},
    },
    domain::{
        cache::{CacheEntry, EntryStatus, validate_key},
        error::DomainError,
    },
};

pub(crate) const METRIC_CACHE_HIT: &str = "itemforge_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "itemforge_cache_miss_total";
pub(crate) const METRIC_CACHE_PENDING: &str = "itemforge_cache_pending_total";
pub(crate) const METRIC_COMPUTE_ENQUEUED: &str = "itemforge_compute_enqueued_total";

#[derive(Debug, Error)]
pub enum ComputeServiceError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error(transparent)]
    Storage(#[from] CacheStoreError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Clone)]
pub struct ComputeService {
    cache: Arc<dyn CacheStore>,
    dispatcher: Arc<dyn Dispatcher>,
    pending_lease: Option<Duration>,
}

impl ComputeService {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        dispatcher: Arc<dyn Dispatcher>,
        pending_lease: Option<Duration>,
    ) -> Self {
        Self {
            cache,
            dispatcher,
            pending_lease,
        }
    }

    pub fn pending_lease(&self) -> Option<Duration> {
        self.pending_lease
    }

    pub async fn health_check(&self) -> Result<(), CacheStoreError> {
        self.cache.health_check().await
    }

    /// Current state of `key`, with pending entries past their lease reported absent.
    pub async fn lookup(&self, key: &str) -> Result<CacheEntry, ComputeServiceError> {
        validate_key(key)?;
        let entry = self
            .cache
            .get(key)
            .await?
            .resolve(OffsetDateTime::now_utc(), self.pending_lease);

        match entry.status {
            EntryStatus::Ready => counter!(METRIC_CACHE_HIT).increment(1),
            EntryStatus::Pending => {
                counter!(METRIC_CACHE_MISS).increment(1);
                counter!(METRIC_CACHE_PENDING).increment(1);
            }
            EntryStatus::Absent => counter!(METRIC_CACHE_MISS).increment(1),
        }

        debug!(
            target = "application::compute",
            op = "lookup",
            key,
            status = entry.status.as_str(),
            "Cache lookup"
        );
        Ok(entry)
    }

    /// Accept a compute request: mark the key pending and enqueue the job.
    ///
    /// Returns as soon as the job is queued. If enqueueing fails the key is
    /// left pending and expires through the lease.
    pub async fn request_compute(
        &self,
        key: &str,
        input: &str,
    ) -> Result<Ticket, ComputeServiceError> {
        validate_key(key)?;
        self.cache.mark_pending(key).await?;

        let ticket = self
            .dispatcher
            .enqueue(Job::Compute(ComputeJobPayload {
                key: key.to_string(),
                input: input.to_string(),
            }))
            .await?;

        counter!(METRIC_COMPUTE_ENQUEUED).increment(1);
        info!(
            target = "application::compute",
            op = "request_compute",
            key,
            ticket = %ticket.id,
            "Compute request accepted"
        );
        Ok(ticket)
    }
}
