//! Item creation and retrieval.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::{
        jobs::{Dispatcher, InspectImageJobPayload, Job},
        repos::{ItemsRepo, ProcessingUpdate, RepoError},
    },
    domain::{
        error::DomainError,
        items::{ImageAttachment, ItemDraft, ItemRecord, ProcessingStatus, is_accepted_image_type},
    },
    infra::uploads::{UploadStorage, UploadStorageError},
};

const DEFAULT_IMAGE_NAME: &str = "image.jpg";

#[derive(Debug, Error)]
pub enum ItemServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Upload(#[from] UploadStorageError),
}

/// Image part of a create request, fully buffered.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct ItemService {
    repo: Arc<dyn ItemsRepo>,
    uploads: Arc<UploadStorage>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl ItemService {
    pub fn new(
        repo: Arc<dyn ItemsRepo>,
        uploads: Arc<UploadStorage>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            repo,
            uploads,
            dispatcher,
        }
    }

    /// Validate and persist an item, then queue its image inspection.
    ///
    /// The record and its image persist together or not at all: a failed
    /// insert removes the stored image again.
    pub async fn create(
        &self,
        draft: ItemDraft,
        image: Option<ImageUpload>,
    ) -> Result<ItemRecord, ItemServiceError> {
        let item = draft.normalize()?;

        let attachment = match image {
            Some(upload) => Some(self.store_image(upload).await?),
            None => None,
        };
        let stored_path = attachment.as_ref().map(|image| image.stored_path.clone());

        let mut record = match self.repo.create_item(item, attachment).await {
            Ok(record) => record,
            Err(err) => {
                if let Some(path) = stored_path {
                    self.discard_image(&path).await;
                }
                return Err(err.into());
            }
        };

        info!(
            target = "application::items",
            op = "create",
            item_id = %record.id,
            has_image = record.image.is_some(),
            "Item created"
        );

        self.queue_inspection(&mut record).await;
        Ok(record)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<ItemRecord>, ItemServiceError> {
        self.repo.find_item(id).await.map_err(Into::into)
    }

    /// Image metadata and bytes for an item, if it has one.
    pub async fn load_image(
        &self,
        id: Uuid,
    ) -> Result<Option<(ImageAttachment, Bytes)>, ItemServiceError> {
        let Some(image) = self.repo.find_item(id).await?.and_then(|item| item.image) else {
            return Ok(None);
        };
        let data = self.uploads.read(&image.stored_path).await?;
        Ok(Some((image, data)))
    }

    pub async fn health_check(&self) -> Result<(), RepoError> {
        self.repo.health_check().await
    }

    async fn store_image(&self, upload: ImageUpload) -> Result<ImageAttachment, ItemServiceError> {
        let content_type = upload.content_type.unwrap_or_default();
        if !is_accepted_image_type(&content_type) {
            return Err(DomainError::validation("image", "Only JPEG images allowed").into());
        }
        if upload.data.is_empty() {
            return Err(DomainError::validation("image", "uploaded file is empty").into());
        }

        let filename = upload
            .filename
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_NAME.to_string());
        let stored = self.uploads.store(&filename, &upload.data).await?;

        Ok(ImageAttachment {
            stored_path: stored.stored_path,
            filename,
            content_type,
            size_bytes: stored.size_bytes,
            checksum: stored.checksum,
            width: None,
            height: None,
        })
    }

    async fn discard_image(&self, stored_path: &str) {
        if let Err(err) = self.uploads.delete(stored_path).await {
            error!(
                target = "application::items",
                stored_path,
                error = %err,
                "Failed to remove image after aborted create"
            );
        }
    }

    /// Enqueue failures are logged; the item itself was created.
    async fn queue_inspection(&self, record: &mut ItemRecord) {
        let job = Job::InspectImage(InspectImageJobPayload { item_id: record.id });
        let ticket = match self.dispatcher.enqueue(job).await {
            Ok(ticket) => ticket,
            Err(err) => {
                warn!(
                    target = "application::items",
                    item_id = %record.id,
                    error = %err,
                    "Failed to enqueue image inspection"
                );
                return;
            }
        };

        let update = ProcessingUpdate {
            queued_if_idle: true,
            task_id: Some(ticket.id.clone()),
            ..Default::default()
        };
        match self.repo.update_processing(record.id, update).await {
            Ok(()) => {
                record.task_id = Some(ticket.id);
                record.processing_status.get_or_insert(ProcessingStatus::Queued);
            }
            Err(err) => warn!(
                target = "application::items",
                item_id = %record.id,
                error = %err,
                "Failed to record inspection ticket"
            ),
        }
    }
}
