//! Redis backend.
//!
//! Wraps a single multiplexed async connection established once at
//! startup.  The connection handle is cheap to clone, so each call works on
//! its own clone and no in-process lock is needed.

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client};
use anyhow::Context;
use bytes::Bytes;
use std::collections::HashMap;

use super::kv::{KvBackend, KvFuture};

/// Number of keys requested per SCAN round trip.
const SCAN_COUNT: usize = 500;

/// Redis-based backend.
#[derive(Clone)]
pub struct RedisBackend {
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Open a connection to `url` (e.g. `redis://localhost:6379/0`) and
    /// verify it with a PING before returning.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client =
            Client::open(url).with_context(|| format!("invalid Redis URL {url:?}"))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .with_context(|| format!("failed to connect to Redis at {url}"))?;

        let backend = Self { conn };
        backend
            .ping()
            .await
            .with_context(|| format!("Redis at {url} did not answer PING"))?;

        tracing::info!(url, "connected to Redis");
        Ok(backend)
    }
}

impl KvBackend for RedisBackend {
    fn ping(&self) -> KvFuture<'_, ()> {
        let mut conn = self.conn.clone();
        Box::pin(async move {
            let pong: String = ::redis::cmd("PING").query_async(&mut conn).await?;
            if pong != "PONG" {
                anyhow::bail!("unexpected PING reply: {pong}");
            }
            Ok(())
        })
    }

    fn exists(&self, key: &str) -> KvFuture<'_, bool> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        Box::pin(async move {
            let exists: bool = conn
                .exists(&key)
                .await
                .with_context(|| format!("EXISTS {key}"))?;
            Ok(exists)
        })
    }

    fn get(&self, key: &str) -> KvFuture<'_, Option<Bytes>> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        Box::pin(async move {
            let value: Option<Vec<u8>> = conn
                .get(&key)
                .await
                .with_context(|| format!("GET {key}"))?;
            Ok(value.map(Bytes::from))
        })
    }

    fn set(&self, key: &str, value: Bytes) -> KvFuture<'_, ()> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        Box::pin(async move {
            let _: () = conn
                .set(&key, &value[..])
                .await
                .with_context(|| format!("SET {key}"))?;
            Ok(())
        })
    }

    fn del(&self, keys: &[String]) -> KvFuture<'_, u64> {
        let mut conn = self.conn.clone();
        let keys = keys.to_vec();
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(0);
            }
            let removed: u64 = conn
                .del(&keys)
                .await
                .with_context(|| format!("DEL {}", keys.join(" ")))?;
            Ok(removed)
        })
    }

    fn hgetall(&self, key: &str) -> KvFuture<'_, HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        Box::pin(async move {
            let fields: HashMap<String, String> = conn
                .hgetall(&key)
                .await
                .with_context(|| format!("HGETALL {key}"))?;
            Ok(fields)
        })
    }

    fn hset(&self, key: &str, fields: &[(String, String)]) -> KvFuture<'_, ()> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let fields = fields.to_vec();
        Box::pin(async move {
            let _: () = conn
                .hset_multiple(&key, &fields[..])
                .await
                .with_context(|| format!("HSET {key}"))?;
            Ok(())
        })
    }

    fn hsetnx(&self, key: &str, field: &str, value: &str) -> KvFuture<'_, bool> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let field = field.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let written: bool = conn
                .hset_nx(&key, &field, &value)
                .await
                .with_context(|| format!("HSETNX {key} {field}"))?;
            Ok(written)
        })
    }

    fn sadd(&self, key: &str, member: &str) -> KvFuture<'_, ()> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let member = member.to_string();
        Box::pin(async move {
            let _: () = conn
                .sadd(&key, &member)
                .await
                .with_context(|| format!("SADD {key}"))?;
            Ok(())
        })
    }

    fn srem(&self, key: &str, member: &str) -> KvFuture<'_, ()> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        let member = member.to_string();
        Box::pin(async move {
            let _: () = conn
                .srem(&key, &member)
                .await
                .with_context(|| format!("SREM {key}"))?;
            Ok(())
        })
    }

    fn smembers(&self, key: &str) -> KvFuture<'_, Vec<String>> {
        let mut conn = self.conn.clone();
        let key = key.to_string();
        Box::pin(async move {
            let members: Vec<String> = conn
                .smembers(&key)
                .await
                .with_context(|| format!("SMEMBERS {key}"))?;
            Ok(members)
        })
    }

    fn scan_match(&self, pattern: &str) -> KvFuture<'_, Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = pattern.to_string();
        Box::pin(async move {
            let mut keys = Vec::new();
            let mut cursor: u64 = 0;
            // SCAN may return a key more than once across iterations.
            let mut seen = std::collections::HashSet::new();
            loop {
                let (next, batch): (u64, Vec<String>) = ::redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query_async(&mut conn)
                    .await
                    .with_context(|| format!("SCAN MATCH {pattern}"))?;
                for key in batch {
                    if seen.insert(key.clone()) {
                        keys.push(key);
                    }
                }
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            Ok(keys)
        })
    }
}
