use serde::{Deserialize, Serialize};

use crate::types::{BucketFamily, RateLimitRule};

/// Limits and housekeeping settings for the abuse guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// General API bucket, keyed by identity
    pub general: RateLimitRule,
    /// Admin operations bucket, keyed by identity
    pub admin: RateLimitRule,
    /// Login attempts bucket, keyed by client IP
    pub login: RateLimitRule,
    /// How often the sweeper drops expired buckets and blocks (seconds)
    pub sweep_interval_secs: u64,
    /// More than this many hits inside `suspicious_window_ms` flags a key
    pub suspicious_threshold: usize,
    pub suspicious_window_ms: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            general: RateLimitRule::new(100, 60_000),
            admin: RateLimitRule::new(20, 60_000),
            login: RateLimitRule::new(5, 15 * 60_000),
            sweep_interval_secs: 300,
            suspicious_threshold: 50,
            suspicious_window_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    /// The configured rule for a bucket family.
    pub fn rule(&self, family: BucketFamily) -> RateLimitRule {
        match family {
            BucketFamily::General => self.general,
            BucketFamily::Admin => self.admin,
            BucketFamily::Login => self.login,
        }
    }
}
