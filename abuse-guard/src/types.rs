use serde::{Deserialize, Serialize};
use std::fmt;

/// Independently keyed families of rate-limit buckets. Exhausting one
/// family never affects the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketFamily {
    General,
    Admin,
    Login,
}

impl fmt::Display for BucketFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketFamily::General => write!(f, "general"),
            BucketFamily::Admin => write!(f, "admin"),
            BucketFamily::Login => write!(f, "login"),
        }
    }
}

/// `max_attempts` hits are allowed per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_attempts: u32,
    pub window_ms: i64,
}

impl RateLimitRule {
    pub const fn new(max_attempts: u32, window_ms: i64) -> Self {
        Self {
            max_attempts,
            window_ms,
        }
    }
}

/// Outcome of a single rate check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
    pub allowed: bool,
    /// Hits counted in the current window, including this one
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
    /// End of the current window, epoch milliseconds
    pub reset_time: i64,
    /// Whole seconds until the window resets; zero when allowed
    pub retry_after_seconds: u64,
    /// Burst detected on this key. Advisory only.
    pub suspicious: bool,
}

/// Per-key counter for one bucket family.
#[derive(Debug, Clone)]
pub(crate) struct Bucket {
    pub count: u32,
    pub reset_time: i64,
    /// Hit times, pruned to the trailing hour
    pub timestamps: Vec<i64>,
}

impl Bucket {
    pub fn new(now: i64, window_ms: i64) -> Self {
        Self {
            count: 0,
            reset_time: now + window_ms,
            timestamps: Vec::new(),
        }
    }
}

/// Whole seconds from `now` until `until`, rounded up, never negative.
pub fn seconds_until(until: i64, now: i64) -> u64 {
    let remaining = (until - now).max(0) as u64;
    remaining.div_ceil(1000)
}
