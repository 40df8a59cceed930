//! In-memory key-value backend.
//!
//! Holds every key in a `tokio::sync::RwLock<HashMap<...>>`.  Nothing is
//! persisted.  Useful for testing and ephemeral deployments; behaves like
//! a single Redis node for the primitives in [`KvBackend`], including
//! type errors on mismatched access.

use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};

use super::kv::{KvBackend, KvFuture};

/// A stored value.  Mirrors the three Redis types the engine touches.
#[derive(Debug, Clone)]
enum Value {
    Str(Bytes),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
        }
    }
}

fn wrong_type(key: &str, found: &Value, wanted: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "WRONGTYPE key {key} holds a {} value, not a {wanted}",
        found.type_name()
    )
}

/// In-process backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: tokio::sync::RwLock<HashMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl KvBackend for MemoryBackend {
    fn ping(&self) -> KvFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }

    fn exists(&self, key: &str) -> KvFuture<'_, bool> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.entries.read().await.contains_key(&key)) })
    }

    fn get(&self, key: &str) -> KvFuture<'_, Option<Bytes>> {
        let key = key.to_string();
        Box::pin(async move {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                None => Ok(None),
                Some(Value::Str(data)) => Ok(Some(data.clone())),
                Some(other) => Err(wrong_type(&key, other, "string")),
            }
        })
    }

    fn set(&self, key: &str, value: Bytes) -> KvFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            self.entries.write().await.insert(key, Value::Str(value));
            Ok(())
        })
    }

    fn del(&self, keys: &[String]) -> KvFuture<'_, u64> {
        let keys = keys.to_vec();
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            let removed = keys
                .iter()
                .filter(|k| entries.remove(k.as_str()).is_some())
                .count();
            Ok(removed as u64)
        })
    }

    fn hgetall(&self, key: &str) -> KvFuture<'_, HashMap<String, String>> {
        let key = key.to_string();
        Box::pin(async move {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                None => Ok(HashMap::new()),
                Some(Value::Hash(fields)) => Ok(fields.clone()),
                Some(other) => Err(wrong_type(&key, other, "hash")),
            }
        })
    }

    fn hset(&self, key: &str, fields: &[(String, String)]) -> KvFuture<'_, ()> {
        let key = key.to_string();
        let fields = fields.to_vec();
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Value::Hash(HashMap::new()));
            match entry {
                Value::Hash(existing) => {
                    existing.extend(fields);
                    Ok(())
                }
                other => Err(wrong_type(&key, other, "hash")),
            }
        })
    }

    fn hsetnx(&self, key: &str, field: &str, value: &str) -> KvFuture<'_, bool> {
        let key = key.to_string();
        let field = field.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Value::Hash(HashMap::new()));
            match entry {
                Value::Hash(existing) => {
                    if existing.contains_key(&field) {
                        return Ok(false);
                    }
                    existing.insert(field, value);
                    Ok(true)
                }
                other => Err(wrong_type(&key, other, "hash")),
            }
        })
    }

    fn sadd(&self, key: &str, member: &str) -> KvFuture<'_, ()> {
        let key = key.to_string();
        let member = member.to_string();
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Value::Set(BTreeSet::new()));
            match entry {
                Value::Set(members) => {
                    members.insert(member);
                    Ok(())
                }
                other => Err(wrong_type(&key, other, "set")),
            }
        })
    }

    fn srem(&self, key: &str, member: &str) -> KvFuture<'_, ()> {
        let key = key.to_string();
        let member = member.to_string();
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            let now_empty = match entries.get_mut(&key) {
                None => return Ok(()),
                Some(Value::Set(members)) => {
                    members.remove(&member);
                    members.is_empty()
                }
                Some(other) => return Err(wrong_type(&key, other, "set")),
            };
            // Redis drops a set once its last member is gone.
            if now_empty {
                entries.remove(&key);
            }
            Ok(())
        })
    }

    fn smembers(&self, key: &str) -> KvFuture<'_, Vec<String>> {
        let key = key.to_string();
        Box::pin(async move {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                None => Ok(Vec::new()),
                Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
                Some(other) => Err(wrong_type(&key, other, "set")),
            }
        })
    }

    fn scan_match(&self, pattern: &str) -> KvFuture<'_, Vec<String>> {
        let pattern = pattern.to_string();
        Box::pin(async move {
            let entries = self.entries.read().await;
            Ok(entries
                .keys()
                .filter(|k| glob_match(&pattern, k))
                .cloned()
                .collect())
        })
    }
}

/// Match `text` against a glob supporting `*` (any run) and `?` (one char).
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` seen and the text index it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, start)) = backtrack {
            pi = star + 1;
            ti = start + 1;
            backtrack = Some((star, start + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}
