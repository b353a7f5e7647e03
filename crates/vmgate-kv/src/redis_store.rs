//! Redis-backed `KvStore`, the production backend behind `KV_URL` (§6).
//!
//! `get_and_delete` is implemented with a single `GETDEL` round trip
//! (Redis ≥ 6.2) so the one-shot challenge consumption invariant (§5
//! "Atomicity") holds without a Lua script.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::{KvError, KvResult, KvStore};

pub struct RedisKv {
    client: redis::Client,
}

impl RedisKv {
    pub fn new(url: &str) -> KvResult<Self> {
        let client = redis::Client::open(url).map_err(to_kv_error)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> KvResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(to_kv_error)
    }
}

fn to_kv_error(e: redis::RedisError) -> KvError {
    KvError::Backend(e.to_string())
}

#[async_trait]
impl KvStore for RedisKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(to_kv_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let mut conn = self.conn().await?;
        if ttl.is_zero() {
            conn.set(key, value).await.map_err(to_kv_error)
        } else {
            conn.set_ex(key, value, ttl.as_secs().max(1))
                .await
                .map_err(to_kv_error)
        }
    }

    async fn get_and_delete(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.conn().await?;
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(to_kv_error)
    }

    async fn s_add(&self, key: &str, member: &str) -> KvResult<()> {
        let mut conn = self.conn().await?;
        conn.sadd(key, member).await.map_err(to_kv_error)
    }

    async fn s_members(&self, key: &str) -> KvResult<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.smembers(key).await.map_err(to_kv_error)
    }

    async fn scan(&self, prefix: &str) -> KvResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let pattern = format!("{prefix}*");
        conn.keys(pattern).await.map_err(to_kv_error)
    }

    async fn l_push(&self, key: &str, value: &str) -> KvResult<()> {
        let mut conn = self.conn().await?;
        conn.lpush(key, value).await.map_err(to_kv_error)
    }

    async fn l_range(&self, key: &str, start: isize, stop: isize) -> KvResult<Vec<String>> {
        let mut conn = self.conn().await?;
        conn.lrange(key, start, stop).await.map_err(to_kv_error)
    }

    async fn l_len(&self, key: &str) -> KvResult<usize> {
        let mut conn = self.conn().await?;
        conn.llen(key).await.map_err(to_kv_error)
    }

    async fn l_trim(&self, key: &str, len: usize) -> KvResult<()> {
        let mut conn = self.conn().await?;
        let stop = len.saturating_sub(1) as isize;
        conn.ltrim(key, 0, stop).await.map_err(to_kv_error)
    }
}
