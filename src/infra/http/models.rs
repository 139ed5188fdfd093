use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::jobs::Ticket;
use crate::domain::cache::{CacheEntry, EntryStatus};
use crate::domain::items::{ImageAttachment, ItemRecord, ProcessingStatus};

const MISS_HINT: &str = "Use POST /items/cache/compute/{key} to calculate value.";
const PENDING_HINT: &str = "Computation in progress; poll again later.";

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub expected_result: Option<String>,
    pub steps: Option<Vec<String>>,
    pub metadata: Option<Value>,
    pub image: Option<ImageResponse>,
    pub task_id: Option<String>,
    pub processing_status: Option<ProcessingStatus>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ImageResponse {
    fn from_attachment(item_id: Uuid, image: ImageAttachment) -> Self {
        Self {
            filename: image.filename,
            content_type: image.content_type,
            size_bytes: image.size_bytes,
            checksum: image.checksum,
            width: image.width,
            height: image.height,
            url: format!("/items/{item_id}/image"),
        }
    }
}

impl From<ItemRecord> for ItemResponse {
    fn from(record: ItemRecord) -> Self {
        let id = record.id;
        Self {
            id,
            title: record.title,
            description: record.description,
            item_type: record.item_type,
            expected_result: record.expected_result,
            steps: record.steps,
            metadata: record.metadata,
            image: record
                .image
                .map(|image| ImageResponse::from_attachment(id, image)),
            task_id: record.task_id,
            processing_status: record.processing_status,
            created_at: record.created_at,
        }
    }
}

/// Client-facing hit/miss classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LookupStatus {
    Hit,
    Miss,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheLookupResponse {
    pub key: String,
    pub value: Option<String>,
    pub status: LookupStatus,
    pub state: EntryStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub written_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<CacheEntry> for CacheLookupResponse {
    fn from(entry: CacheEntry) -> Self {
        let (status, message) = match entry.status {
            EntryStatus::Ready => (LookupStatus::Hit, None),
            EntryStatus::Pending => (LookupStatus::Miss, Some(PENDING_HINT.to_string())),
            EntryStatus::Absent => (LookupStatus::Miss, Some(MISS_HINT.to_string())),
        };
        let value = entry.visible_value().map(str::to_string);

        Self {
            key: entry.key,
            value,
            status,
            state: entry.status,
            written_at: entry.written_at,
            message,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ComputeForm {
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComputeAcceptedResponse {
    pub key: String,
    pub task_id: String,
    pub status: String,
}

impl ComputeAcceptedResponse {
    pub const STATUS: &'static str = "Processing triggered";

    pub fn new(key: String, ticket: Ticket) -> Self {
        Self {
            key,
            task_id: ticket.id,
            status: Self::STATUS.to_string(),
        }
    }
}
