//! Bucket-level handlers.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::errors::ApiError;
use crate::AppState;

/// `GET /` -- List all bucket names.
#[utoipa::path(
    get,
    path = "/",
    tag = "Bucket",
    operation_id = "ListBuckets",
    responses(
        (status = 200, description = "Bucket names", body = [String]),
        (status = 503, description = "Backend unavailable")
    )
)]
pub async fn list_buckets(state: Arc<AppState>) -> Result<Response, ApiError> {
    let buckets = state.store.list_buckets().await?;
    Ok((StatusCode::OK, Json(buckets)).into_response())
}

/// `PUT /{bucket}` -- Create a new bucket.
#[utoipa::path(
    put,
    path = "/{bucket}",
    tag = "Bucket",
    operation_id = "CreateBucket",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 201, description = "Bucket created"),
        (status = 400, description = "Invalid bucket name"),
        (status = 409, description = "Bucket already exists")
    )
)]
pub async fn create_bucket(state: Arc<AppState>, bucket: &str) -> Result<Response, ApiError> {
    state.store.create_bucket(bucket).await?;
    tracing::info!(bucket, "bucket created");
    Ok(StatusCode::CREATED.into_response())
}

/// `DELETE /{bucket}` -- Delete a bucket together with every object in it.
#[utoipa::path(
    delete,
    path = "/{bucket}",
    tag = "Bucket",
    operation_id = "DeleteBucket",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 204, description = "Bucket and its objects deleted"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn delete_bucket(state: Arc<AppState>, bucket: &str) -> Result<Response, ApiError> {
    state.store.delete_bucket(bucket).await?;
    tracing::info!(bucket, "bucket deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `HEAD /{bucket}` -- Check whether a bucket exists.
#[utoipa::path(
    head,
    path = "/{bucket}",
    tag = "Bucket",
    operation_id = "HeadBucket",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "Bucket exists"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn head_bucket(state: Arc<AppState>, bucket: &str) -> Result<Response, ApiError> {
    // HEAD responses have no body, so absence is a bare 404.
    let status = if state.store.bucket_exists(bucket).await? {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok(status.into_response())
}
