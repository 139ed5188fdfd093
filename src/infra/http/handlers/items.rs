//! Item handlers

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{
    HeaderValue, StatusCode,
    header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use uuid::Uuid;

use crate::application::items::ImageUpload;
use crate::domain::items::ItemDraft;
use crate::infra::http::error::{ApiError, item_to_api};
use crate::infra::http::models::ItemResponse;
use crate::infra::http::state::AppState;

pub async fn create_item(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut draft = ItemDraft::default();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request("invalid multipart payload", Some(err.to_string())))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "image" {
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.map_err(|err| {
                ApiError::bad_request("failed to read upload", Some(err.to_string()))
            })?;
            // Browsers send an empty part when no file was chosen.
            if filename.as_deref().is_some_and(|name| !name.is_empty()) || !data.is_empty() {
                image = Some(ImageUpload {
                    filename,
                    content_type,
                    data,
                });
            }
            continue;
        }

        let text = field.text().await.map_err(|err| {
            ApiError::bad_request("failed to read form field", Some(err.to_string()))
        })?;
        let slot = match name.as_str() {
            "title" => &mut draft.title,
            "description" => &mut draft.description,
            "metadata" => &mut draft.metadata,
            "type" => &mut draft.item_type,
            "expected_result" => &mut draft.expected_result,
            "steps" => &mut draft.steps,
            _ => continue,
        };
        *slot = Some(text);
    }

    let record = state
        .items
        .create(draft, image)
        .await
        .map_err(item_to_api)?;

    Ok((StatusCode::CREATED, Json(ItemResponse::from(record))))
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_item_id(&id, "item not found")?;
    match state.items.find(id).await.map_err(item_to_api)? {
        Some(record) => Ok(Json(ItemResponse::from(record))),
        None => Err(ApiError::not_found("item not found")),
    }
}

pub async fn get_item_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_item_id(&id, "image not found")?;
    let (image, bytes) = state
        .items
        .load_image(id)
        .await
        .map_err(item_to_api)?
        .ok_or_else(|| ApiError::not_found("image not found"))?;

    Ok(build_image_response(&image.content_type, bytes))
}

/// An id that cannot name an item is reported like any other missing item.
fn parse_item_id(raw: &str, missing: &'static str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(missing))
}

fn build_image_response(content_type: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
