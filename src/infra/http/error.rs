use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::{
    compute::ComputeServiceError,
    error::ErrorReport,
    items::ItemServiceError,
    jobs::DispatchError,
    repos::{CacheStoreError, RepoError},
};
use crate::domain::error::DomainError;
use crate::infra::uploads::UploadStorageError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const VALIDATION: &str = "validation_error";
    pub const DUPLICATE: &str = "duplicate";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INTEGRITY: &str = "integrity_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const REPO: &str = "repo_error";
    pub const UPLOAD: &str = "upload_error";
    pub const STORAGE_UNAVAILABLE: &str = "storage_unavailable";
    pub const DISPATCH_UNAVAILABLE: &str = "dispatch_unavailable";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http",
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}

pub(crate) fn domain_to_api(err: DomainError) -> ApiError {
    match err {
        DomainError::NotFound { .. } => ApiError::not_found("resource not found"),
        DomainError::Validation { field, message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::VALIDATION,
            "Validation failed",
            Some(format!("{field}: {message}")),
        ),
    }
}

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::NotFound => ApiError::not_found("resource not found"),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(message) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(message),
        ),
    }
}

pub(crate) fn upload_storage_to_api(err: UploadStorageError) -> ApiError {
    let status = match err {
        UploadStorageError::InvalidPath | UploadStorageError::SizeOverflow => {
            StatusCode::BAD_REQUEST
        }
        UploadStorageError::Io(_) | UploadStorageError::Join(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    ApiError::new(
        status,
        codes::UPLOAD,
        "Failed to access stored image",
        Some(err.to_string()),
    )
}

pub(crate) fn cache_store_to_api(err: CacheStoreError) -> ApiError {
    ApiError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        codes::STORAGE_UNAVAILABLE,
        "Cache storage unavailable",
        Some(err.to_string()),
    )
}

pub(crate) fn dispatch_to_api(err: DispatchError) -> ApiError {
    ApiError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        codes::DISPATCH_UNAVAILABLE,
        "Job queue unavailable",
        Some(err.to_string()),
    )
}

pub(crate) fn item_to_api(err: ItemServiceError) -> ApiError {
    match err {
        ItemServiceError::Domain(domain) => domain_to_api(domain),
        ItemServiceError::Repo(repo) => repo_to_api(repo),
        ItemServiceError::Upload(upload) => upload_storage_to_api(upload),
    }
}

pub(crate) fn compute_to_api(err: ComputeServiceError) -> ApiError {
    match err {
        ComputeServiceError::Validation(domain) => domain_to_api(domain),
        ComputeServiceError::Storage(storage) => cache_store_to_api(storage),
        ComputeServiceError::Dispatch(dispatch) => dispatch_to_api(dispatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_failures_map_to_service_unavailable() {
        let err = compute_to_api(ComputeServiceError::Storage(CacheStoreError::unavailable(
            "disk gone",
        )));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = err.into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert!(report.messages[0].starts_with(codes::STORAGE_UNAVAILABLE));
    }

    #[test]
    fn validation_failures_map_to_bad_request() {
        let err = item_to_api(ItemServiceError::Domain(DomainError::validation(
            "image",
            "Only JPEG images allowed",
        )));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
