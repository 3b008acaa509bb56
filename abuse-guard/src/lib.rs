//! In-memory abuse guard: sliding-window rate limits, explicit blocks and
//! progressive backoff, keyed by identity or client IP.
//!
//! Three bucket families ([`BucketFamily`]) are tracked independently:
//! general API traffic, admin operations and login attempts. The guard never
//! returns errors; every call yields a decision the caller acts on.
//!
//! Memory is bounded by a periodic sweep that drops buckets and blocks whose
//! reset time has passed (see [`AbuseGuard::start_sweeper`]).

pub mod clock;
pub mod config;
pub mod guard;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RateLimitConfig;
pub use guard::AbuseGuard;
pub use store::{InMemoryRateLimitStore, RateLimitStore};
pub use types::{seconds_until, BucketFamily, RateDecision, RateLimitRule};
