//! Item records and the normalisation rules applied to submitted form fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

/// Content types accepted for item images.
pub const ACCEPTED_IMAGE_TYPES: [&str; 2] = ["image/jpeg", "image/jpg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Queued,
    Processing,
    NoImage,
    ReadError,
    InspectFailed,
    Done,
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Queued => "queued",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::NoImage => "no_image",
            ProcessingStatus::ReadError => "read_error",
            ProcessingStatus::InspectFailed => "inspect_failed",
            ProcessingStatus::Done => "done",
        }
    }
}

impl TryFrom<&str> for ProcessingStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "queued" => Ok(ProcessingStatus::Queued),
            "processing" => Ok(ProcessingStatus::Processing),
            "no_image" => Ok(ProcessingStatus::NoImage),
            "read_error" => Ok(ProcessingStatus::ReadError),
            "inspect_failed" => Ok(ProcessingStatus::InspectFailed),
            "done" => Ok(ProcessingStatus::Done),
            _ => Err(()),
        }
    }
}

/// Stored image belonging to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub stored_path: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub item_type: Option<String>,
    pub expected_result: Option<String>,
    pub steps: Option<Vec<String>>,
    pub metadata: Option<Value>,
    pub image: Option<ImageAttachment>,
    pub task_id: Option<String>,
    pub processing_status: Option<ProcessingStatus>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Raw text fields as submitted by a client.
#[derive(Debug, Clone, Default)]
pub struct ItemDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<String>,
    pub item_type: Option<String>,
    pub expected_result: Option<String>,
    pub steps: Option<String>,
}

/// Validated item fields ready for persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub title: String,
    pub description: Option<String>,
    pub item_type: Option<String>,
    pub expected_result: Option<String>,
    pub steps: Option<Vec<String>>,
    pub metadata: Option<Value>,
}

impl ItemDraft {
    pub fn normalize(self) -> Result<NewItem, DomainError> {
        let title = non_blank(self.title)
            .ok_or_else(|| DomainError::validation("title", "must not be blank"))?;

        Ok(NewItem {
            title,
            description: non_blank(self.description),
            item_type: non_blank(self.item_type),
            expected_result: non_blank(self.expected_result),
            steps: non_blank(self.steps).map(|raw| parse_steps(&raw)),
            metadata: non_blank(self.metadata).map(|raw| parse_metadata(&raw)),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Steps may arrive as a JSON list; anything else is kept as a single raw step.
pub fn parse_steps(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(values)) => values
            .into_iter()
            .map(|value| match value {
                Value::String(text) => text,
                other => other.to_string(),
            })
            .collect(),
        Ok(Value::String(text)) => vec![text],
        _ => vec![raw.to_string()],
    }
}

/// Metadata must be a JSON object; other input is preserved under `raw`.
pub fn parse_metadata(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(object @ Value::Object(_)) => object,
        _ => {
            let mut map = Map::new();
            map.insert("raw".to_string(), Value::String(raw.to_string()));
            Value::Object(map)
        }
    }
}

pub fn is_accepted_image_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    ACCEPTED_IMAGE_TYPES.contains(&essence.as_str())
}
