use std::sync::Arc;

use apalis::prelude::Error as ApalisError;
use thiserror::Error;

use crate::{
    application::repos::{CacheStore, CacheStoreError, ItemsRepo, RepoError},
    infra::uploads::UploadStorage,
};

use super::compute::{ComputeError, Computation};

/// Shared context passed to job workers so they can access infrastructure capabilities.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub items: Arc<dyn ItemsRepo>,
    pub cache: Arc<dyn CacheStore>,
    pub uploads: Arc<UploadStorage>,
    pub computation: Arc<dyn Computation>,
}

/// Failure of a single job attempt. The dispatcher decides whether to retry.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Compute(#[from] ComputeError),
    #[error(transparent)]
    Cache(#[from] CacheStoreError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
