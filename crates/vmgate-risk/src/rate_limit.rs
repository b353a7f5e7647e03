//! Tiered token-bucket-ish rate limiter (§4.7 "Rate limiter").
//!
//! Three tiers, indexed by the caller's past-violation count (capped to
//! 2), each with its own `(limit, jitter, window)`. A bucket is
//! `wall_time_ms / window_ms`; a per-`(ip, tier, bucket)` counter in the
//! KV store tracks request volume. Six violations inside a rolling 2
//! minute window escalate to a timed block.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vmgate_kv::KvStore;

/// `(limit, jitter, window)` per violation tier. Tunable; not specified
/// numerically by the external interface, only the shape of the
/// mechanism, so these are a reasonable concrete default.
const TIERS: [(u32, u32, u64); 3] = [
    (30, 5, 10_000),
    (15, 3, 10_000),
    (5, 2, 10_000),
];

const VIOLATION_WINDOW_SECS: i64 = 120;
const VIOLATIONS_TO_BLOCK: usize = 6;
const BASE_BLOCK_SECS: i64 = 8;
const BLOCK_STEP_SECS: i64 = 3;
const BLOCK_JITTER_SECS: i64 = 2;
const MAX_BLOCK_SECS: i64 = 25;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RateLimitState {
    violations: u32,
    last_violations: Vec<i64>,
    block_until: i64,
    block_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitDecision {
    Allowed,
    Blocked { retry_after: Duration },
}

pub struct RateLimiter<'a> {
    kv: &'a dyn KvStore,
}

impl<'a> RateLimiter<'a> {
    pub fn new(kv: &'a dyn KvStore) -> Self {
        Self { kv }
    }

    /// Evaluate a single request from `ip` arriving at wall-clock `now`
    /// (unix seconds). `now_ms` is the same instant in milliseconds, used
    /// for bucketing.
    pub async fn check(&self, ip: &str, now: i64, now_ms: i64) -> RateLimitDecision {
        let state_key = format!("risk:rl:{ip}");
        let mut state: RateLimitState = self
            .kv
            .get(&state_key)
            .await
            .ok()
            .flatten()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();

        if now < state.block_until {
            return RateLimitDecision::Blocked {
                retry_after: Duration::from_secs((state.block_until - now).max(1) as u64),
            };
        }

        let tier = (state.violations as usize).min(TIERS.len() - 1);
        let (limit, jitter, window_ms) = TIERS[tier];
        let bucket = now_ms as u64 / window_ms;
        let counter_key = format!("risk:req:{ip}:{tier}:{bucket}");

        let count = self.increment_counter(&counter_key, window_ms).await;
        let effective_limit = limit as i64 + seeded_jitter(ip, tier, bucket, jitter);
        if (count as i64) <= effective_limit {
            return RateLimitDecision::Allowed;
        }

        // Violation: record it, check escalation, persist state.
        state.violations = state.violations.saturating_add(1);
        state.last_violations.push(now);
        state.last_violations.retain(|&t| now - t <= VIOLATION_WINDOW_SECS);
        if state.last_violations.len() > 10 {
            let drop = state.last_violations.len() - 10;
            state.last_violations.drain(0..drop);
        }

        if state.last_violations.len() >= VIOLATIONS_TO_BLOCK {
            state.block_count = state.block_count.saturating_add(1);
            let raw = BASE_BLOCK_SECS + BLOCK_STEP_SECS * (state.block_count as i64 - 1);
            let jittered = raw + seeded_jitter(ip, state.block_count as usize, bucket, BLOCK_JITTER_SECS as u32);
            let duration = jittered.clamp(1, MAX_BLOCK_SECS);
            state.block_until = now + duration;
            state.last_violations.clear();

            self.persist(&state_key, &state, duration.max(1) as u64).await;
            return RateLimitDecision::Blocked {
                retry_after: Duration::from_secs(duration as u64),
            };
        }

        self.persist(&state_key, &state, VIOLATION_WINDOW_SECS as u64).await;
        RateLimitDecision::Allowed
    }

    async fn increment_counter(&self, key: &str, window_ms: u64) -> u64 {
        let current = self.kv.get(key).await.ok().flatten();
        let count: u64 = current.and_then(|s| s.parse().ok()).unwrap_or(0) + 1;
        let ttl = Duration::from_millis(window_ms) + Duration::from_secs(10);
        let _ = self.kv.set(key, &count.to_string(), ttl).await;
        count
    }

    async fn persist(&self, key: &str, state: &RateLimitState, ttl_secs: u64) {
        if let Ok(json) = serde_json::to_string(state) {
            let _ = self.kv.set(key, &json, Duration::from_secs(ttl_secs.max(state.block_until.max(0) as u64))).await;
        }
    }
}

/// A deterministic pseudorandom offset in `[-jitter, jitter]`, seeded by
/// the caller's identity so repeated checks against the same bucket see a
/// stable effective limit rather than a different one on every call.
fn seeded_jitter(ip: &str, tier: usize, bucket: u64, jitter: u32) -> i64 {
    if jitter == 0 {
        return 0;
    }
    let mut hash: u64 = 1469598103934665603; // FNV offset basis
    for byte in ip.bytes().chain(tier.to_le_bytes()).chain(bucket.to_le_bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    let span = (2 * jitter + 1) as u64;
    (hash % span) as i64 - jitter as i64
}
