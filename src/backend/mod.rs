//! Key-value backend connection.
//!
//! The [`kv::KvBackend`] trait lists the primitives the storage engine is
//! allowed to use.  Each call is individually atomic; nothing here offers
//! multi-key transactions.  Implementations are a Redis client and an
//! in-process map with the same semantics.

pub mod kv;
pub mod memory;
pub mod redis;

pub use self::kv::KvBackend;
pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;
