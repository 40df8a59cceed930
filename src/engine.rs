//! Bucket and object lifecycle on top of a key-value backend.
//!
//! A bucket is a metadata hash plus a contents-index set; an object is a
//! metadata hash plus a data string.  These live under separate keys (see
//! [`crate::schema`]) and the backend cannot update them atomically, so
//! every operation runs a fixed sequence of single-key calls:
//!
//! - writes go metadata, then data, then index;
//! - deletes go metadata + data (one call), then index.
//!
//! The first failing call aborts the operation and its error is returned
//! as-is.  Calls that already succeeded stay committed; there is no
//! rollback and no retry.  An interrupted delete therefore leaves at worst
//! an index entry whose metadata is gone, which readers report as
//! `NotFound`.  Retrying the failed operation converges.

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::KvBackend;
use crate::errors::StoreError;
use crate::schema;

/// Content type recorded when the caller supplies none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Object metadata as stored alongside the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// A fully read object.
#[derive(Debug, Clone)]
pub struct Object {
    pub key: String,
    pub content_type: String,
    pub data: Bytes,
    pub created_at: DateTime<Utc>,
}

/// The storage engine.  Cheap to clone; all clones share one backend handle.
#[derive(Clone)]
pub struct ObjectStore {
    backend: Arc<dyn KvBackend>,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore").finish_non_exhaustive()
    }
}

impl ObjectStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Liveness check against the backend.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.backend.ping().await?;
        Ok(())
    }

    // -- Buckets ---------------------------------------------------------

    /// Create an empty bucket.  The contents index is not written until the
    /// first object arrives.
    pub async fn create_bucket(&self, name: &str) -> Result<(), StoreError> {
        observe("create_bucket", self.try_create_bucket(name).await)
    }

    async fn try_create_bucket(&self, name: &str) -> Result<(), StoreError> {
        schema::validate_bucket_name(name)?;

        // One HSETNX both checks for and claims the name.
        let created = self
            .backend
            .hsetnx(
                &schema::bucket_key(name),
                schema::FIELD_CREATION_DATE,
                &format_timestamp(Utc::now()),
            )
            .await?;
        if !created {
            return Err(StoreError::AlreadyExists {
                bucket: name.to_string(),
            });
        }

        debug!(bucket = name, "bucket created");
        Ok(())
    }

    /// Delete a bucket and every object listed in its contents index.
    ///
    /// Objects are removed one at a time; the first failure stops the
    /// operation with the objects deleted so far gone for good.  Calling
    /// again finishes the job.
    pub async fn delete_bucket(&self, name: &str) -> Result<(), StoreError> {
        observe("delete_bucket", self.try_delete_bucket(name).await)
    }

    async fn try_delete_bucket(&self, name: &str) -> Result<(), StoreError> {
        self.require_bucket(name).await?;

        let contents_key = schema::contents_key(name);
        let members = self.backend.smembers(&contents_key).await?;
        let count = members.len();
        for key in &members {
            self.remove_object_records(name, key).await?;
        }

        self.backend
            .del(&[schema::bucket_key(name), contents_key])
            .await?;

        debug!(bucket = name, objects = count, "bucket deleted");
        Ok(())
    }

    /// Names of all buckets, sorted.
    pub async fn list_buckets(&self) -> Result<Vec<String>, StoreError> {
        observe("list_buckets", self.try_list_buckets().await)
    }

    async fn try_list_buckets(&self) -> Result<Vec<String>, StoreError> {
        let keys = self
            .backend
            .scan_match(&schema::bucket_scan_pattern())
            .await?;
        let mut names: Vec<String> = keys
            .iter()
            .filter_map(|k| schema::bucket_name_from_key(k))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub async fn bucket_exists(&self, name: &str) -> Result<bool, StoreError> {
        let exists = self.backend.exists(&schema::bucket_key(name)).await?;
        Ok(exists)
    }

    // -- Objects ---------------------------------------------------------

    /// Store `data` under `key`, replacing any existing object.
    ///
    /// `content_type` falls back to [`DEFAULT_CONTENT_TYPE`] when absent or
    /// blank.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<ObjectMeta, StoreError> {
        observe(
            "put_object",
            self.try_put_object(bucket, key, content_type, data).await,
        )
    }

    async fn try_put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<ObjectMeta, StoreError> {
        self.require_bucket(bucket).await?;

        let meta = ObjectMeta {
            content_type: content_type
                .map(str::trim)
                .filter(|ct| !ct.is_empty())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
            size: data.len() as u64,
            created_at: Utc::now(),
        };

        let fields = [
            (
                schema::FIELD_CONTENT_TYPE.to_string(),
                meta.content_type.clone(),
            ),
            (schema::FIELD_SIZE.to_string(), meta.size.to_string()),
            (
                schema::FIELD_CREATION_DATE.to_string(),
                format_timestamp(meta.created_at),
            ),
        ];
        self.backend
            .hset(&schema::object_metadata_key(bucket, key), &fields)
            .await?;
        self.backend
            .set(&schema::object_data_key(bucket, key), data)
            .await?;
        self.backend
            .sadd(&schema::contents_key(bucket), key)
            .await?;

        debug!(bucket, key, size = meta.size, "object stored");
        Ok(meta)
    }

    /// Read an object's metadata and payload.
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Object, StoreError> {
        observe("get_object", self.try_get_object(bucket, key).await)
    }

    async fn try_get_object(&self, bucket: &str, key: &str) -> Result<Object, StoreError> {
        let mut metadata = self
            .backend
            .hgetall(&schema::object_metadata_key(bucket, key))
            .await?;
        if metadata.is_empty() {
            return Err(StoreError::object_not_found(bucket, key));
        }

        let data = match self
            .backend
            .get(&schema::object_data_key(bucket, key))
            .await?
        {
            Some(data) => data,
            None => {
                warn!(bucket, key, "object metadata present without data");
                return Err(StoreError::Corrupt {
                    message: format!("object {bucket}/{key} has metadata but no data"),
                });
            }
        };

        let raw_date = metadata
            .remove(schema::FIELD_CREATION_DATE)
            .unwrap_or_default();
        let created_at = parse_timestamp(&raw_date).ok_or_else(|| StoreError::Corrupt {
            message: format!("object {bucket}/{key} has unparseable creation date {raw_date:?}"),
        })?;

        let content_type = metadata
            .remove(schema::FIELD_CONTENT_TYPE)
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        Ok(Object {
            key: key.to_string(),
            content_type,
            data,
            created_at,
        })
    }

    /// Remove an object.  Succeeds whether or not the object existed.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        observe("delete_object", self.try_delete_object(bucket, key).await)
    }

    async fn try_delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.require_bucket(bucket).await?;
        self.remove_object_records(bucket, key).await
    }

    /// Keys currently in the bucket's contents index, sorted.
    pub async fn list_objects(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        observe("list_objects", self.try_list_objects(bucket).await)
    }

    async fn try_list_objects(&self, bucket: &str) -> Result<Vec<String>, StoreError> {
        self.require_bucket(bucket).await?;
        let mut keys = self
            .backend
            .smembers(&schema::contents_key(bucket))
            .await?;
        keys.sort();
        Ok(keys)
    }

    pub async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        let exists = self
            .backend
            .exists(&schema::object_metadata_key(bucket, key))
            .await?;
        Ok(exists)
    }

    // -- Helpers ---------------------------------------------------------

    async fn require_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        if self.bucket_exists(bucket).await? {
            Ok(())
        } else {
            Err(StoreError::bucket_not_found(bucket))
        }
    }

    /// Metadata and data in one call, then the index entry.
    async fn remove_object_records(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.backend
            .del(&[
                schema::object_metadata_key(bucket, key),
                schema::object_data_key(bucket, key),
            ])
            .await?;
        self.backend
            .srem(&schema::contents_key(bucket), key)
            .await?;
        debug!(bucket, key, "object deleted");
        Ok(())
    }
}

/// Count the outcome of an engine operation.
fn observe<T>(op: &'static str, result: Result<T, StoreError>) -> Result<T, StoreError> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    crate::metrics::record_store_operation(op, outcome);
    result
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
