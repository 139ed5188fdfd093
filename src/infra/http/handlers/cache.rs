//! Compute-then-cache handlers

use axum::extract::{Form, Path, State, rejection::FormRejection};
use axum::{Json, response::IntoResponse};

use crate::infra::http::error::{ApiError, compute_to_api};
use crate::infra::http::models::{CacheLookupResponse, ComputeAcceptedResponse, ComputeForm};
use crate::infra::http::state::AppState;

pub async fn get_cache(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state.compute.lookup(&key).await.map_err(compute_to_api)?;
    Ok(Json(CacheLookupResponse::from(entry)))
}

pub async fn compute_cache(
    State(state): State<AppState>,
    Path(key): Path<String>,
    form: Result<Form<ComputeForm>, FormRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Form(form) = form.map_err(|err| {
        ApiError::bad_request("form field `value` is required", Some(err.body_text()))
    })?;
    let ticket = state
        .compute
        .request_compute(&key, &form.value)
        .await
        .map_err(compute_to_api)?;

    Ok(Json(ComputeAcceptedResponse::new(key, ticket)))
}
