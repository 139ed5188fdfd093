//! In-memory item repository used when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    application::repos::{ItemsRepo, ProcessingUpdate, RepoError},
    domain::items::{ImageAttachment, ItemRecord, NewItem, ProcessingStatus},
};

#[derive(Debug, Default)]
pub struct MemoryItemsRepo {
    items: RwLock<HashMap<Uuid, ItemRecord>>,
}

impl MemoryItemsRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl ItemsRepo for MemoryItemsRepo {
    async fn create_item(
        &self,
        item: NewItem,
        image: Option<ImageAttachment>,
    ) -> Result<ItemRecord, RepoError> {
        let record = ItemRecord {
            id: Uuid::new_v4(),
            title: item.title,
            description: item.description,
            item_type: item.item_type,
            expected_result: item.expected_result,
            steps: item.steps,
            metadata: item.metadata,
            image,
            task_id: None,
            processing_status: None,
            created_at: OffsetDateTime::now_utc(),
        };

        let mut items = self.items.write().await;
        if items.contains_key(&record.id) {
            return Err(RepoError::Duplicate {
                constraint: "items_pkey".to_string(),
            });
        }
        items.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_item(&self, id: Uuid) -> Result<Option<ItemRecord>, RepoError> {
        Ok(self.items.read().await.get(&id).cloned())
    }

    async fn update_processing(
        &self,
        id: Uuid,
        update: ProcessingUpdate,
    ) -> Result<(), RepoError> {
        let mut items = self.items.write().await;
        let record = items.get_mut(&id).ok_or(RepoError::NotFound)?;

        if update.queued_if_idle && record.processing_status.is_none() {
            record.processing_status = Some(ProcessingStatus::Queued);
        } else if let Some(status) = update.status {
            record.processing_status = Some(status);
        }
        if let Some(task_id) = update.task_id {
            record.task_id = Some(task_id);
        }
        if let (Some((width, height)), Some(image)) = (update.dimensions, record.image.as_mut()) {
            image.width = Some(width);
            image.height = Some(height);
        }
        Ok(())
    }
}
