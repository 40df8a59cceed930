//! Object-level handlers.

use std::sync::Arc;
use std::time::SystemTime;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::engine::DEFAULT_CONTENT_TYPE;
use crate::errors::ApiError;
use crate::AppState;

/// Format a stored creation time as an RFC 7231 HTTP date.
fn http_date(created_at: DateTime<Utc>) -> String {
    httpdate::fmt_http_date(SystemTime::from(created_at))
}

/// `PUT /{bucket}/{key}` -- Store an object, replacing any previous version.
#[utoipa::path(
    put,
    path = "/{bucket}/{key}",
    tag = "Object",
    operation_id = "PutObject",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key"),
        ("Content-Type" = Option<String>, Header, description = "Stored content type")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "Object stored"),
        (status = 400, description = "Object too large"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn put_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let max = state.config.server.max_object_size;
    if body.len() as u64 > max {
        return Err(ApiError::BadRequest {
            message: format!(
                "object size {} exceeds the maximum of {max} bytes",
                body.len()
            ),
        });
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    state
        .store
        .put_object(bucket, key, content_type, body)
        .await?;

    Ok(StatusCode::CREATED.into_response())
}

/// `GET /{bucket}/{key}` -- Return an object's bytes.
#[utoipa::path(
    get,
    path = "/{bucket}/{key}",
    tag = "Object",
    operation_id = "GetObject",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key")
    ),
    responses(
        (status = 200, description = "Object data", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 404, description = "Bucket or object not found"),
        (status = 500, description = "Stored records are corrupt")
    )
)]
pub async fn get_object(state: Arc<AppState>, bucket: &str, key: &str) -> Result<Response, ApiError> {
    let object = state.store.get_object(bucket, key).await?;

    let content_type = HeaderValue::from_str(&object.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let last_modified = http_date(object.created_at);

    let mut response = (StatusCode::OK, object.data).into_response();
    let hdrs = response.headers_mut();
    hdrs.insert(header::CONTENT_TYPE, content_type);
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        hdrs.insert(header::LAST_MODIFIED, value);
    }
    Ok(response)
}

/// `HEAD /{bucket}/{key}` -- Check whether an object exists.
#[utoipa::path(
    head,
    path = "/{bucket}/{key}",
    tag = "Object",
    operation_id = "HeadObject",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key")
    ),
    responses(
        (status = 200, description = "Object exists"),
        (status = 404, description = "Object not found")
    )
)]
pub async fn head_object(state: Arc<AppState>, bucket: &str, key: &str) -> Result<Response, ApiError> {
    let status = if state.store.object_exists(bucket, key).await? {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok(status.into_response())
}

/// `DELETE /{bucket}/{key}` -- Remove an object.
#[utoipa::path(
    delete,
    path = "/{bucket}/{key}",
    tag = "Object",
    operation_id = "DeleteObject",
    params(
        ("bucket" = String, Path, description = "Bucket name"),
        ("key" = String, Path, description = "Object key")
    ),
    responses(
        (status = 204, description = "Object deleted"),
        (status = 404, description = "Bucket or object not found")
    )
)]
pub async fn delete_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
) -> Result<Response, ApiError> {
    state.store.delete_object(bucket, key).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /{bucket}` -- List the keys stored in a bucket.
#[utoipa::path(
    get,
    path = "/{bucket}",
    tag = "Object",
    operation_id = "ListObjects",
    params(("bucket" = String, Path, description = "Bucket name")),
    responses(
        (status = 200, description = "Object keys", body = [String]),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn list_objects(state: Arc<AppState>, bucket: &str) -> Result<Response, ApiError> {
    let keys = state.store.list_objects(bucket).await?;
    Ok((StatusCode::OK, Json(keys)).into_response())
}
