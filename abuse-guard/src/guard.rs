use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;
use crate::store::{InMemoryRateLimitStore, RateLimitStore};
use crate::types::{BucketFamily, RateDecision, RateLimitRule};

/// Block durations applied by [`AbuseGuard::penalize`], indexed by how many
/// violations the key collected within the last hour.
const BACKOFF_STEPS: [Duration; 4] = [
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(15 * 60),
    Duration::from_secs(60 * 60),
];

struct Sweeper {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Rate limiting and blocking service.
///
/// Construct one per process and share it behind an `Arc`. The guard only
/// returns decisions; acting on them is up to the caller.
pub struct AbuseGuard {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
    sweeper: Mutex<Option<Sweeper>>,
}

impl AbuseGuard {
    /// Create a guard with the given store and clock.
    pub fn new(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            sweeper: Mutex::new(None),
        }
    }

    /// Create a guard backed by process memory and the system clock.
    pub fn in_memory(config: RateLimitConfig) -> Self {
        let store = InMemoryRateLimitStore::new(
            config.suspicious_threshold,
            config.suspicious_window_ms,
        );
        Self::new(Arc::new(store), Arc::new(SystemClock), config)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Counts a hit against the configured rule of `family`.
    pub async fn check(&self, family: BucketFamily, key: &str) -> RateDecision {
        let rule = self.config.rule(family);
        self.check_rate(family, key, rule.max_attempts, rule.window_ms)
            .await
    }

    /// Counts a hit for `key` allowing `max_attempts` per `window_ms`.
    pub async fn check_rate(
        &self,
        family: BucketFamily,
        key: &str,
        max_attempts: u32,
        window_ms: i64,
    ) -> RateDecision {
        let rule = RateLimitRule::new(max_attempts, window_ms);
        let decision = self
            .store
            .record_hit(family, key, rule, self.clock.now_ms())
            .await;
        if decision.suspicious {
            warn!(
                "Suspicious request burst: family={}, key={}, count={}",
                family, key, decision.count
            );
        }
        decision
    }

    /// Rejects every request from `key` for `duration`.
    pub async fn block(&self, key: &str, duration: Duration) {
        let until = self.clock.now_ms() + duration.as_millis() as i64;
        self.store.set_block(key, until).await;
        warn!("Blocked {} for {:?}", key, duration);
    }

    pub async fn unblock(&self, key: &str) {
        self.store.clear_block(key).await;
        info!("Unblocked {}", key);
    }

    pub async fn is_blocked(&self, key: &str) -> bool {
        self.blocked_until(key).await.is_some()
    }

    /// Expiry of the active block on `key`, epoch milliseconds.
    pub async fn blocked_until(&self, key: &str) -> Option<i64> {
        self.store.block_expiry(key, self.clock.now_ms()).await
    }

    /// Records a violation and blocks `key` for a duration that grows with
    /// the number of violations in the last hour. Returns the duration.
    pub async fn penalize(&self, key: &str) -> Duration {
        let violations = self
            .store
            .record_violation(key, self.clock.now_ms())
            .await;
        let step = violations.saturating_sub(1).min(BACKOFF_STEPS.len() - 1);
        let duration = BACKOFF_STEPS[step];
        self.block(key, duration).await;
        duration
    }

    /// Drops expired buckets and blocks. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let removed = self.store.sweep(self.clock.now_ms()).await;
        if removed > 0 {
            debug!("Rate limit sweep removed {} entries", removed);
        }
        removed
    }

    /// Number of live buckets across all families.
    pub async fn bucket_count(&self) -> usize {
        self.store.bucket_count().await
    }

    /// Spawns the periodic sweep on the current tokio runtime.
    ///
    /// Calling it again while a sweeper is running does nothing.
    pub fn start_sweeper(self: &Arc<Self>) {
        let Ok(mut slot) = self.sweeper.lock() else {
            warn!("Sweeper state poisoned; not starting");
            return;
        };
        if slot.is_some() {
            return;
        }

        let (stop, mut stopped) = oneshot::channel();
        let guard = Arc::clone(self);
        let period = Duration::from_secs(self.config.sweep_interval_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        guard.sweep().await;
                    }
                    _ = &mut stopped => break,
                }
            }
            debug!("Rate limit sweeper stopped");
        });

        *slot = Some(Sweeper { stop, handle });
        info!("Rate limit sweeper started (every {:?})", period);
    }

    /// Stops the sweeper and waits for it to exit.
    pub async fn stop(&self) {
        let sweeper = match self.sweeper.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(sweeper) = sweeper {
            let _ = sweeper.stop.send(());
            if let Err(e) = sweeper.handle.await {
                warn!("Rate limit sweeper ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use rstest::rstest;

    fn guard_with_clock() -> (AbuseGuard, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let guard = AbuseGuard::new(
            Arc::new(InMemoryRateLimitStore::default()),
            clock.clone(),
            RateLimitConfig::default(),
        );
        (guard, clock)
    }

    #[tokio::test]
    async fn test_rate_window_reset() {
        let (guard, clock) = guard_with_clock();
        let window = 30_000;

        for _ in 0..5 {
            let decision = guard
                .check_rate(BucketFamily::General, "u@x.com", 5, window)
                .await;
            assert!(decision.allowed);
        }
        let sixth = guard
            .check_rate(BucketFamily::General, "u@x.com", 5, window)
            .await;
        assert!(!sixth.allowed);

        clock.set(sixth.reset_time + 1);
        let next = guard
            .check_rate(BucketFamily::General, "u@x.com", 5, window)
            .await;
        assert!(next.allowed);
        assert_eq!(next.count, 1);
    }

    #[rstest]
    #[case(BucketFamily::General, 100)]
    #[case(BucketFamily::Admin, 20)]
    #[case(BucketFamily::Login, 5)]
    #[tokio::test]
    async fn test_family_default_limits(#[case] family: BucketFamily, #[case] limit: u32) {
        let (guard, _clock) = guard_with_clock();
        for _ in 0..limit {
            assert!(guard.check(family, "key").await.allowed);
        }
        let denied = guard.check(family, "key").await;
        assert!(!denied.allowed);
        assert_eq!(denied.limit, limit);
        assert_eq!(denied.remaining, 0);
    }

    #[tokio::test]
    async fn test_admin_limit_retry_after() {
        let (guard, clock) = guard_with_clock();
        for _ in 0..20 {
            assert!(guard.check(BucketFamily::Admin, "a@x.com").await.allowed);
        }
        clock.advance(Duration::from_millis(12_300));
        let denied = guard.check(BucketFamily::Admin, "a@x.com").await;
        assert!(!denied.allowed);
        // 60s window opened at t0, 12.3s elapsed: 47.7s left, rounded up.
        assert_eq!(denied.retry_after_seconds, 48);
    }

    #[tokio::test]
    async fn test_block_and_unblock() {
        let (guard, clock) = guard_with_clock();
        assert!(!guard.is_blocked("k").await);

        guard.block("k", Duration::from_secs(10)).await;
        assert!(guard.is_blocked("k").await);

        clock.advance(Duration::from_secs(11));
        assert!(!guard.is_blocked("k").await);

        guard.block("k", Duration::from_secs(10)).await;
        guard.unblock("k").await;
        assert!(!guard.is_blocked("k").await);
    }

    #[tokio::test]
    async fn test_penalize_backs_off_progressively() {
        let (guard, _clock) = guard_with_clock();
        let durations = [
            guard.penalize("k").await,
            guard.penalize("k").await,
            guard.penalize("k").await,
            guard.penalize("k").await,
            guard.penalize("k").await,
        ];
        assert_eq!(durations[0], Duration::from_secs(60));
        assert_eq!(durations[1], Duration::from_secs(300));
        assert_eq!(durations[2], Duration::from_secs(900));
        assert_eq!(durations[3], Duration::from_secs(3600));
        assert_eq!(durations[4], Duration::from_secs(3600));
        assert!(guard.is_blocked("k").await);
    }

    #[tokio::test]
    async fn test_sweep_uses_clock() {
        let (guard, clock) = guard_with_clock();
        guard.check(BucketFamily::Login, "10.0.0.1").await;
        guard.check(BucketFamily::General, "u@x.com").await;
        assert_eq!(guard.bucket_count().await, 2);

        clock.advance(Duration::from_secs(61));
        assert_eq!(guard.sweep().await, 1);
        assert_eq!(guard.bucket_count().await, 1);

        clock.advance(Duration::from_secs(15 * 60));
        guard.sweep().await;
        assert_eq!(guard.bucket_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_periodically_and_stops() {
        let clock = Arc::new(ManualClock::new(0));
        let guard = Arc::new(AbuseGuard::new(
            Arc::new(InMemoryRateLimitStore::default()),
            clock.clone(),
            RateLimitConfig::default(),
        ));
        guard.check(BucketFamily::General, "u@x.com").await;
        clock.advance(Duration::from_secs(120));

        guard.start_sweeper();
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(guard.bucket_count().await, 0);

        guard.stop().await;
    }
}
