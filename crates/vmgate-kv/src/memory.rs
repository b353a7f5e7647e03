//! In-memory `KvStore`, TTL-aware. Used for tests and as the default
//! backend when `KV_URL` points nowhere reachable during development.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{KvResult, KvStore};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(t) => Instant::now() < t,
            None => true,
        }
    }
}

#[derive(Default)]
struct Inner {
    strings: HashMap<String, Entry>,
    sets: HashMap<String, HashSet<String>>,
    lists: HashMap<String, Vec<String>>,
}

/// A `parking_lot`-guarded in-memory store. Suitable for a single process;
/// not shared across instances (use [`RedisKv`](crate::RedisKv) for that).
#[derive(Default)]
pub struct InMemoryKv {
    inner: Mutex<Inner>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut inner = self.inner.lock();
        match inner.strings.get(key) {
            Some(e) if e.is_live() => Ok(Some(e.value.clone())),
            Some(_) => {
                inner.strings.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> KvResult<()> {
        let mut inner = self.inner.lock();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        inner.strings.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_and_delete(&self, key: &str) -> KvResult<Option<String>> {
        let mut inner = self.inner.lock();
        match inner.strings.remove(key) {
            Some(e) if e.is_live() => Ok(Some(e.value)),
            _ => Ok(None),
        }
    }

    async fn s_add(&self, key: &str, member: &str) -> KvResult<()> {
        let mut inner = self.inner.lock();
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn s_members(&self, key: &str) -> KvResult<Vec<String>> {
        let inner = self.inner.lock();
        Ok(inner
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scan(&self, prefix: &str) -> KvResult<Vec<String>> {
        let inner = self.inner.lock();
        Ok(inner
            .strings
            .keys()
            .filter(|k| k.starts_with(prefix) && inner.strings[*k].is_live())
            .cloned()
            .collect())
    }

    async fn l_push(&self, key: &str, value: &str) -> KvResult<()> {
        let mut inner = self.inner.lock();
        inner.lists.entry(key.to_string()).or_default().insert(0, value.to_string());
        Ok(())
    }

    async fn l_range(&self, key: &str, start: isize, stop: isize) -> KvResult<Vec<String>> {
        let inner = self.inner.lock();
        let list = match inner.lists.get(key) {
            Some(l) => l,
            None => return Ok(Vec::new()),
        };
        let len = list.len() as isize;
        let norm = |i: isize| -> isize {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len)
            }
        };
        let (s, e) = (norm(start), norm(stop));
        if s > e || s >= len {
            return Ok(Vec::new());
        }
        let end = (e + 1).min(len) as usize;
        Ok(list[s as usize..end].to_vec())
    }

    async fn l_len(&self, key: &str) -> KvResult<usize> {
        let inner = self.inner.lock();
        Ok(inner.lists.get(key).map(Vec::len).unwrap_or(0))
    }

    async fn l_trim(&self, key: &str, len: usize) -> KvResult<()> {
        let mut inner = self.inner.lock();
        if let Some(list) = inner.lists.get_mut(key) {
            list.truncate(len);
        }
        Ok(())
    }
}
