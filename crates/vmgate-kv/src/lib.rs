//! The KV store abstraction used throughout the challenge protocol (§6
//! "KV keys"): string get/set with TTL, atomic get-and-delete for one-shot
//! challenge consumption, set membership for dedup, and lists for the
//! capped `manager:requests` feed.

pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryKv;
#[cfg(feature = "redis-backend")]
pub use redis_store::RedisKv;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv backend error: {0}")]
    Backend(String),
}

pub type KvResult<T> = Result<T, KvError>;

/// Everything the challenge protocol needs from a key-value store. All
/// implementations must make `get_and_delete` atomic: a concurrent reader
/// must never observe the value both fetched and still present.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> KvResult<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()>;
    /// Atomically read and remove `key`. Returns `None` if absent or
    /// already consumed by a concurrent caller.
    async fn get_and_delete(&self, key: &str) -> KvResult<Option<String>>;
    async fn s_add(&self, key: &str, member: &str) -> KvResult<()>;
    async fn s_members(&self, key: &str) -> KvResult<Vec<String>>;
    /// List keys matching a `prefix*`-style glob. Used sparingly (ASN
    /// table maintenance, admin tooling); not on any hot path.
    async fn scan(&self, prefix: &str) -> KvResult<Vec<String>>;
    async fn l_push(&self, key: &str, value: &str) -> KvResult<()>;
    async fn l_range(&self, key: &str, start: isize, stop: isize) -> KvResult<Vec<String>>;
    async fn l_len(&self, key: &str) -> KvResult<usize>;
    /// Trim `key` down to its first `len` elements, dropping the rest.
    /// Used to cap the `manager:requests` feed at a fixed size.
    async fn l_trim(&self, key: &str, len: usize) -> KvResult<()>;
}
