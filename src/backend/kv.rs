//! Abstract key-value backend trait.
//!
//! The trait uses manually desugared async methods (pinned boxed futures)
//! so it stays object-safe and can be shared as `Arc<dyn KvBackend>`.

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every backend call.
pub type KvFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Primitives consumed by the storage engine.
///
/// Semantics follow Redis: reading a missing key yields an empty value
/// rather than an error, deleting a missing key is a no-op, and a hash or
/// set whose last field/member is removed ceases to exist.
pub trait KvBackend: Send + Sync + 'static {
    /// Liveness check.
    fn ping(&self) -> KvFuture<'_, ()>;

    /// Whether `key` holds a value of any type.
    fn exists(&self, key: &str) -> KvFuture<'_, bool>;

    /// Read a string value.
    fn get(&self, key: &str) -> KvFuture<'_, Option<Bytes>>;

    /// Write a string value, replacing whatever `key` held.
    fn set(&self, key: &str, value: Bytes) -> KvFuture<'_, ()>;

    /// Remove every key in `keys` in one call, returning how many existed.
    fn del(&self, keys: &[String]) -> KvFuture<'_, u64>;

    /// Read all fields of a hash.  A missing key yields an empty map.
    fn hgetall(&self, key: &str) -> KvFuture<'_, HashMap<String, String>>;

    /// Set several hash fields in one call.
    fn hset(&self, key: &str, fields: &[(String, String)]) -> KvFuture<'_, ()>;

    /// Set one hash field only if it is absent.  Returns `true` when the
    /// field was written.
    fn hsetnx(&self, key: &str, field: &str, value: &str) -> KvFuture<'_, bool>;

    /// Add `member` to the set at `key`.
    fn sadd(&self, key: &str, member: &str) -> KvFuture<'_, ()>;

    /// Remove `member` from the set at `key`.
    fn srem(&self, key: &str, member: &str) -> KvFuture<'_, ()>;

    /// All members of the set at `key`.  A missing key yields no members.
    fn smembers(&self, key: &str) -> KvFuture<'_, Vec<String>>;

    /// Every key matching a glob `pattern` (`*` and `?` wildcards).
    fn scan_match(&self, pattern: &str) -> KvFuture<'_, Vec<String>>;
}
