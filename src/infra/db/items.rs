use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ItemsRepo, ProcessingUpdate, RepoError},
    domain::items::{ImageAttachment, ItemRecord, NewItem, ProcessingStatus},
};

use super::{PostgresRepositories, map_sqlx_error};

const ITEM_COLUMNS: &str = "id, title, description, item_type, expected_result, steps, metadata, \
    image_path, image_filename, image_content_type, image_size_bytes, image_checksum, \
    image_width, image_height, task_id, processing_status, created_at";

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    item_type: Option<String>,
    expected_result: Option<String>,
    steps: Option<Json<Vec<String>>>,
    metadata: Option<JsonValue>,
    image_path: Option<String>,
    image_filename: Option<String>,
    image_content_type: Option<String>,
    image_size_bytes: Option<i64>,
    image_checksum: Option<String>,
    image_width: Option<i32>,
    image_height: Option<i32>,
    task_id: Option<String>,
    processing_status: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<ItemRow> for ItemRecord {
    type Error = RepoError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let processing_status = row
            .processing_status
            .as_deref()
            .map(|raw| {
                ProcessingStatus::try_from(raw).map_err(|_| {
                    RepoError::from_persistence(format!("unknown processing status `{raw}`"))
                })
            })
            .transpose()?;

        let image = match (
            row.image_path,
            row.image_filename,
            row.image_content_type,
            row.image_size_bytes,
            row.image_checksum,
        ) {
            (Some(stored_path), Some(filename), Some(content_type), Some(size_bytes), Some(checksum)) => {
                Some(ImageAttachment {
                    stored_path,
                    filename,
                    content_type,
                    size_bytes,
                    checksum,
                    width: row.image_width,
                    height: row.image_height,
                })
            }
            (None, None, None, None, None) => None,
            _ => {
                return Err(RepoError::Integrity {
                    message: format!("item `{}` has a partial image record", row.id),
                });
            }
        };

        Ok(Self {
            id: row.id,
            title: row.title,
            description: row.description,
            item_type: row.item_type,
            expected_result: row.expected_result,
            steps: row.steps.map(|steps| steps.0),
            metadata: row.metadata,
            image,
            task_id: row.task_id,
            processing_status,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ItemsRepo for PostgresRepositories {
    async fn create_item(
        &self,
        item: NewItem,
        image: Option<ImageAttachment>,
    ) -> Result<ItemRecord, RepoError> {
        let id = Uuid::new_v4();
        let steps = item.steps.map(Json);
        let image = image.as_ref();

        let sql = format!(
            "INSERT INTO items (id, title, description, item_type, expected_result, steps, metadata, \
                 image_path, image_filename, image_content_type, image_size_bytes, image_checksum, \
                 image_width, image_height) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {ITEM_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(id)
            .bind(item.title)
            .bind(item.description)
            .bind(item.item_type)
            .bind(item.expected_result)
            .bind(steps)
            .bind(item.metadata)
            .bind(image.map(|image| image.stored_path.clone()))
            .bind(image.map(|image| image.filename.clone()))
            .bind(image.map(|image| image.content_type.clone()))
            .bind(image.map(|image| image.size_bytes))
            .bind(image.map(|image| image.checksum.clone()))
            .bind(image.and_then(|image| image.width))
            .bind(image.and_then(|image| image.height))
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        ItemRecord::try_from(row)
    }

    async fn find_item(&self, id: Uuid) -> Result<Option<ItemRecord>, RepoError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1");
        let row = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(ItemRecord::try_from).transpose()
    }

    async fn update_processing(
        &self,
        id: Uuid,
        update: ProcessingUpdate,
    ) -> Result<(), RepoError> {
        let (width, height) = update.dimensions.unzip();
        let result = sqlx::query(
            r#"
            UPDATE items
               SET processing_status = CASE
                       WHEN $2 AND processing_status IS NULL THEN 'queued'
                       ELSE COALESCE($3, processing_status)
                   END,
                   task_id = COALESCE($4, task_id),
                   image_width = COALESCE($5, image_width),
                   image_height = COALESCE($6, image_height)
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.queued_if_idle)
        .bind(update.status.map(ProcessingStatus::as_str))
        .bind(update.task_id)
        .bind(width)
        .bind(height)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        PostgresRepositories::health_check(self)
            .await
            .map_err(map_sqlx_error)
    }
}
