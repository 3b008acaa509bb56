//! Storage strategy for rate-limit state.
//!
//! [`RateLimitStore`] is the seam between the guard's policy and where the
//! counters live. [`InMemoryRateLimitStore`] keeps them in process memory,
//! which is only correct for a single-instance deployment; a shared backend
//! implements the same trait to make limits hold across instances.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::types::{seconds_until, Bucket, BucketFamily, RateDecision, RateLimitRule};

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Backing storage for buckets, blocks and violation history.
///
/// Implementations never fail towards the caller: a shared backend that
/// cannot be reached must degrade to an allowing decision and log it.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Counts one hit for `key` in `family` and returns the decision.
    async fn record_hit(
        &self,
        family: BucketFamily,
        key: &str,
        rule: RateLimitRule,
        now: i64,
    ) -> RateDecision;

    /// Blocks `key` until `until` (epoch ms).
    async fn set_block(&self, key: &str, until: i64);

    /// Lifts any block on `key`.
    async fn clear_block(&self, key: &str);

    /// Expiry of the active block on `key`. Expired blocks are removed.
    async fn block_expiry(&self, key: &str, now: i64) -> Option<i64>;

    /// Records a violation for `key` and returns the number of violations
    /// within the trailing hour, including this one.
    async fn record_violation(&self, key: &str, now: i64) -> usize;

    /// Drops every bucket and block whose reset time has passed.
    /// Returns how many entries were removed.
    async fn sweep(&self, now: i64) -> usize;

    /// Number of live buckets across all families.
    async fn bucket_count(&self) -> usize;
}

/// Process-local rate-limit state.
#[derive(Debug)]
pub struct InMemoryRateLimitStore {
    general: DashMap<String, Bucket>,
    admin: DashMap<String, Bucket>,
    login: DashMap<String, Bucket>,
    blocks: DashMap<String, i64>,
    violations: DashMap<String, Vec<i64>>,
    suspicious_threshold: usize,
    suspicious_window_ms: i64,
}

impl InMemoryRateLimitStore {
    pub fn new(suspicious_threshold: usize, suspicious_window_ms: i64) -> Self {
        Self {
            general: DashMap::new(),
            admin: DashMap::new(),
            login: DashMap::new(),
            blocks: DashMap::new(),
            violations: DashMap::new(),
            suspicious_threshold,
            suspicious_window_ms,
        }
    }

    fn buckets(&self, family: BucketFamily) -> &DashMap<String, Bucket> {
        match family {
            BucketFamily::General => &self.general,
            BucketFamily::Admin => &self.admin,
            BucketFamily::Login => &self.login,
        }
    }
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new(50, 60_000)
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn record_hit(
        &self,
        family: BucketFamily,
        key: &str,
        rule: RateLimitRule,
        now: i64,
    ) -> RateDecision {
        let mut bucket = self
            .buckets(family)
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(now, rule.window_ms));

        if now > bucket.reset_time {
            bucket.count = 0;
            bucket.reset_time = now + rule.window_ms;
        }

        bucket.count = bucket.count.saturating_add(1);
        bucket.timestamps.push(now);
        bucket.timestamps.retain(|t| now - *t < HOUR_MS);

        let recent = bucket
            .timestamps
            .iter()
            .filter(|t| now - **t < self.suspicious_window_ms)
            .count();
        let suspicious = recent > self.suspicious_threshold;

        let allowed = bucket.count <= rule.max_attempts;
        let decision = RateDecision {
            allowed,
            count: bucket.count,
            limit: rule.max_attempts,
            remaining: rule.max_attempts.saturating_sub(bucket.count),
            reset_time: bucket.reset_time,
            retry_after_seconds: if allowed {
                0
            } else {
                seconds_until(bucket.reset_time, now)
            },
            suspicious,
        };

        if !allowed {
            debug!(
                "Rate limit exceeded: family={}, key={}, count={}/{}",
                family, key, decision.count, decision.limit
            );
        }

        decision
    }

    async fn set_block(&self, key: &str, until: i64) {
        self.blocks.insert(key.to_string(), until);
    }

    async fn clear_block(&self, key: &str) {
        self.blocks.remove(key);
    }

    async fn block_expiry(&self, key: &str, now: i64) -> Option<i64> {
        let until = *self.blocks.get(key)?;
        if now > until {
            self.blocks.remove(key);
            debug!("Block on {} expired", key);
            return None;
        }
        Some(until)
    }

    async fn record_violation(&self, key: &str, now: i64) -> usize {
        let mut history = self.violations.entry(key.to_string()).or_default();
        history.retain(|t| now - *t < HOUR_MS);
        history.push(now);
        history.len()
    }

    async fn sweep(&self, now: i64) -> usize {
        let mut removed = 0;
        for family in [BucketFamily::General, BucketFamily::Admin, BucketFamily::Login] {
            let buckets = self.buckets(family);
            let before = buckets.len();
            buckets.retain(|_, bucket| bucket.reset_time >= now);
            removed += before - buckets.len();
        }

        let before = self.blocks.len();
        self.blocks.retain(|_, until| *until >= now);
        removed += before - self.blocks.len();

        self.violations.retain(|_, history| {
            history.retain(|t| now - *t < HOUR_MS);
            !history.is_empty()
        });

        removed
    }

    async fn bucket_count(&self) -> usize {
        self.general.len() + self.admin.len() + self.login.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: RateLimitRule = RateLimitRule::new(5, 10_000);

    #[tokio::test]
    async fn test_hits_are_counted_until_limit() {
        let store = InMemoryRateLimitStore::default();
        for expected in 1..=5 {
            let decision = store
                .record_hit(BucketFamily::General, "u@x.com", RULE, 1_000)
                .await;
            assert!(decision.allowed);
            assert_eq!(decision.count, expected);
            assert_eq!(decision.remaining, 5 - expected);
            assert_eq!(decision.reset_time, 11_000);
        }

        let denied = store
            .record_hit(BucketFamily::General, "u@x.com", RULE, 2_500)
            .await;
        assert!(!denied.allowed);
        assert_eq!(denied.count, 6);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after_seconds, 9);
    }

    #[tokio::test]
    async fn test_window_resets_only_after_reset_time() {
        let store = InMemoryRateLimitStore::default();
        for _ in 0..6 {
            store
                .record_hit(BucketFamily::General, "k", RULE, 0)
                .await;
        }

        // Exactly at reset time the window is still closed.
        let at_reset = store.record_hit(BucketFamily::General, "k", RULE, 10_000).await;
        assert!(!at_reset.allowed);

        let after = store.record_hit(BucketFamily::General, "k", RULE, 10_001).await;
        assert!(after.allowed);
        assert_eq!(after.count, 1);
        assert_eq!(after.reset_time, 20_001);
    }

    #[tokio::test]
    async fn test_families_are_independent() {
        let store = InMemoryRateLimitStore::default();
        let tight = RateLimitRule::new(1, 10_000);
        store.record_hit(BucketFamily::Admin, "k", tight, 0).await;
        let admin = store.record_hit(BucketFamily::Admin, "k", tight, 0).await;
        assert!(!admin.allowed);

        let general = store.record_hit(BucketFamily::General, "k", tight, 0).await;
        assert!(general.allowed);
        let login = store.record_hit(BucketFamily::Login, "k", tight, 0).await;
        assert!(login.allowed);
    }

    #[tokio::test]
    async fn test_burst_is_flagged_suspicious_without_blocking() {
        let store = InMemoryRateLimitStore::default();
        let generous = RateLimitRule::new(1_000, 60_000);
        let mut last = None;
        for i in 0..51 {
            last = Some(
                store
                    .record_hit(BucketFamily::General, "burst", generous, i * 100)
                    .await,
            );
        }
        let last = last.unwrap();
        assert!(last.suspicious);
        assert!(last.allowed);

        let calm = store
            .record_hit(BucketFamily::General, "calm", generous, 0)
            .await;
        assert!(!calm.suspicious);
    }

    #[tokio::test]
    async fn test_fifty_hits_in_a_minute_is_not_suspicious() {
        let store = InMemoryRateLimitStore::default();
        let generous = RateLimitRule::new(1_000, 60_000);
        let mut suspicious = false;
        for i in 0..50 {
            suspicious = store
                .record_hit(BucketFamily::General, "k", generous, i * 100)
                .await
                .suspicious;
        }
        assert!(!suspicious);
    }

    #[tokio::test]
    async fn test_block_expires_lazily() {
        let store = InMemoryRateLimitStore::default();
        store.set_block("k", 5_000).await;
        assert_eq!(store.block_expiry("k", 4_000).await, Some(5_000));
        assert_eq!(store.block_expiry("k", 5_001).await, None);
        // Removed on the expired lookup.
        assert_eq!(store.block_expiry("k", 0).await, None);
    }

    #[tokio::test]
    async fn test_violations_counted_over_trailing_hour() {
        let store = InMemoryRateLimitStore::default();
        assert_eq!(store.record_violation("k", 0).await, 1);
        assert_eq!(store.record_violation("k", 1_000).await, 2);
        assert_eq!(store.record_violation("k", HOUR_MS + 500).await, 2);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let store = InMemoryRateLimitStore::default();
        store.record_hit(BucketFamily::General, "old", RULE, 0).await;
        store.record_hit(BucketFamily::Login, "old", RULE, 0).await;
        store.record_hit(BucketFamily::Admin, "fresh", RULE, 50_000).await;
        store.set_block("blocked-old", 1_000).await;
        store.set_block("blocked-fresh", 100_000).await;

        let removed = store.sweep(20_000).await;
        assert_eq!(removed, 3);
        assert_eq!(store.bucket_count().await, 1);
        assert_eq!(store.block_expiry("blocked-fresh", 20_000).await, Some(100_000));
    }
}
