//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::cache::CacheEntry;
use crate::domain::items::{ImageAttachment, ItemRecord, NewItem, ProcessingStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Fields a worker may update after an item has been created.
///
/// `None` leaves the stored value untouched. `queued_if_idle` sets the status
/// to `queued` only while no status has been recorded, so a fast worker's
/// progress is never rolled back by the request that queued it.
#[derive(Debug, Clone, Default)]
pub struct ProcessingUpdate {
    pub status: Option<ProcessingStatus>,
    pub queued_if_idle: bool,
    pub task_id: Option<String>,
    pub dimensions: Option<(i32, i32)>,
}

#[async_trait]
pub trait ItemsRepo: Send + Sync {
    async fn create_item(
        &self,
        item: NewItem,
        image: Option<ImageAttachment>,
    ) -> Result<ItemRecord, RepoError>;

    async fn find_item(&self, id: Uuid) -> Result<Option<ItemRecord>, RepoError>;

    async fn update_processing(&self, id: Uuid, update: ProcessingUpdate)
    -> Result<(), RepoError>;

    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// The cache medium could not serve the request.
#[derive(Debug, Error)]
pub enum CacheStoreError {
    #[error("cache storage unavailable: {message}")]
    StorageUnavailable { message: String },
}

impl CacheStoreError {
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable {
            message: message.to_string(),
        }
    }
}

/// Key-value persistence backing the compute/poll protocol.
///
/// Implementations must never expose a partially written entry and must
/// serialize concurrent writers of the same key. Errors are reported, never
/// retried internally.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Current entry for `key`; unknown keys are `absent`.
    async fn get(&self, key: &str) -> Result<CacheEntry, CacheStoreError>;

    /// Store a computed value, making the entry `ready`. Last write wins.
    async fn put(&self, key: &str, value: &str) -> Result<CacheEntry, CacheStoreError>;

    /// Mark a compute request as accepted for `key`.
    async fn mark_pending(&self, key: &str) -> Result<CacheEntry, CacheStoreError>;

    /// Remove pending entries accepted at or before `cutoff`, returning how many went.
    async fn purge_stale_pending(&self, cutoff: OffsetDateTime) -> Result<u64, CacheStoreError>;

    async fn health_check(&self) -> Result<(), CacheStoreError> {
        Ok(())
    }
}
