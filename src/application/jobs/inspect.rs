//! Image inspection job: record the dimensions of an item's uploaded image.

use apalis::prelude::{Data, Error as ApalisError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{application::repos::ProcessingUpdate, domain::items::ProcessingStatus};

use super::context::{JobError, JobWorkerContext, job_failed};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectImageJobPayload {
    pub item_id: Uuid,
}

pub async fn run_inspect_image_job(
    ctx: &JobWorkerContext,
    payload: &InspectImageJobPayload,
) -> Result<(), JobError> {
    let item_id = payload.item_id;

    let Some(item) = ctx.items.find_item(item_id).await? else {
        warn!(
            target = "application::jobs::inspect",
            item_id = %item_id,
            "Item vanished before inspection; nothing to do"
        );
        return Ok(());
    };

    set_status(ctx, item_id, ProcessingStatus::Processing).await?;

    let Some(image) = item.image else {
        set_status(ctx, item_id, ProcessingStatus::NoImage).await?;
        return Ok(());
    };

    let bytes = match ctx.uploads.read(&image.stored_path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                target = "application::jobs::inspect",
                item_id = %item_id,
                stored_path = %image.stored_path,
                error = %err,
                "Failed to read stored image"
            );
            set_status(ctx, item_id, ProcessingStatus::ReadError).await?;
            return Ok(());
        }
    };

    let dimensions = imagesize::blob_size(&bytes)
        .ok()
        .and_then(|size| Some((i32::try_from(size.width).ok()?, i32::try_from(size.height).ok()?)));

    let Some((width, height)) = dimensions else {
        warn!(
            target = "application::jobs::inspect",
            item_id = %item_id,
            "Stored image could not be decoded"
        );
        set_status(ctx, item_id, ProcessingStatus::InspectFailed).await?;
        return Ok(());
    };

    ctx.items
        .update_processing(
            item_id,
            ProcessingUpdate {
                status: Some(ProcessingStatus::Done),
                dimensions: Some((width, height)),
                ..Default::default()
            },
        )
        .await?;

    info!(
        target = "application::jobs::inspect",
        item_id = %item_id,
        width,
        height,
        "Image inspected"
    );
    Ok(())
}

async fn set_status(
    ctx: &JobWorkerContext,
    item_id: Uuid,
    status: ProcessingStatus,
) -> Result<(), JobError> {
    ctx.items
        .update_processing(
            item_id,
            ProcessingUpdate {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
        .map_err(JobError::from)
}

pub async fn process_inspect_image_job(
    payload: InspectImageJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    run_inspect_image_job(&context, &payload)
        .await
        .map_err(job_failed)
}
