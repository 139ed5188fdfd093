//! HTTP surface: item CRUD, the compute/poll endpoints and a health probe.

mod error;
mod handlers;
mod middleware;
pub mod models;
mod state;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use state::AppState;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::application::error::ErrorReport;

use self::middleware::{assign_request_id, log_responses};

pub fn build_router(state: AppState, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/items", post(handlers::create_item))
        .route("/items/{id}", get(handlers::get_item))
        .route("/items/{id}/image", get(handlers::get_item_image))
        .route("/items/cache/{key}", get(handlers::get_cache))
        .route("/items/cache/compute/{key}", post(handlers::compute_cache))
        .route("/_health", get(health))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(assign_request_id))
}

async fn health(State(state): State<AppState>) -> Response {
    if let Err(err) = state.items.health_check().await {
        return unavailable("infra::http::health::items", &err);
    }
    if let Err(err) = state.compute.health_check().await {
        return unavailable("infra::http::health::cache", &err);
    }
    StatusCode::NO_CONTENT.into_response()
}

fn unavailable(source: &'static str, err: &(dyn std::error::Error + 'static)) -> Response {
    let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
    ErrorReport::from_error(source, StatusCode::SERVICE_UNAVAILABLE, err).attach(&mut response);
    response
}
