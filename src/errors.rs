//! Error types.
//!
//! [`StoreError`] is what the storage engine returns; it knows nothing about
//! HTTP.  [`ApiError`] wraps it for handlers and implements
//! [`axum::response::IntoResponse`] so handlers can simply return
//! `Err(StoreError::NotFound { .. }.into())`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Failure kinds surfaced by the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A bucket or object required by the operation is absent.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// `create_bucket` on a name that is already taken.
    #[error("bucket {bucket} already exists")]
    AlreadyExists { bucket: String },

    /// The bucket name cannot be stored without breaking the key layout.
    #[error("invalid bucket name: {name:?}")]
    InvalidBucketName { name: String },

    /// The backend call failed (connection, protocol, or type error).
    #[error("backend unavailable: {0:#}")]
    BackendUnavailable(#[from] anyhow::Error),

    /// Stored records are present but unusable.
    #[error("corrupt record: {message}")]
    Corrupt { message: String },
}

impl StoreError {
    pub fn bucket_not_found(bucket: &str) -> Self {
        StoreError::NotFound {
            resource: format!("bucket {bucket}"),
        }
    }

    pub fn object_not_found(bucket: &str, key: &str) -> Self {
        StoreError::NotFound {
            resource: format!("object {bucket}/{key}"),
        }
    }

    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::AlreadyExists { .. } => "already_exists",
            StoreError::InvalidBucketName { .. } => "invalid_bucket_name",
            StoreError::BackendUnavailable(_) => "backend_unavailable",
            StoreError::Corrupt { .. } => "corrupt",
        }
    }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// An engine failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The request was rejected before reaching the engine.
    #[error("{message}")]
    BadRequest { message: String },
}

impl ApiError {
    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::AlreadyExists { .. }) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::InvalidBucketName { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::BackendUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(StoreError::Corrupt { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({ "error": self.to_string() }).to_string();
        (status, [("content-type", "application/json")], body).into_response()
    }
}
