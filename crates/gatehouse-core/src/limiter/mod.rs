//! Fixed-window rate limiting with per-key buckets.
//!
//! Unlike a token bucket, a fixed window resets entirely at window
//! boundaries: the first request for a key opens a window, requests within
//! it count against the limit, and the counter is replaced (not refilled)
//! once the window elapses. This permits bursts at window edges but keeps
//! the arithmetic and the distributed variant trivially simple.

pub mod distributed;

pub use distributed::DistributedRateLimiter;

use dashmap::DashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window (0 when denied).
    pub remaining: u32,
    /// Time until the current window resets.
    pub reset_after: Duration,
    /// Unix timestamp (seconds) at which the window resets.
    pub reset_at: u64,
    /// Whether the shared store was configured but unreachable, so this
    /// decision came from the local fallback. Informational only; callers
    /// treat degraded decisions exactly like local ones.
    pub degraded: bool,
}

impl RateDecision {
    /// Seconds a denied client should wait before retrying, rounded up and
    /// never zero.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        let millis = self.reset_after.as_millis();
        u64::try_from(millis.div_ceil(1000)).unwrap_or(u64::MAX).max(1)
    }
}

/// State for one key's current window.
struct FixedWindow {
    count: u32,
    window_ends: Instant,
}

/// Fixed-window rate limiter keyed by arbitrary strings.
///
/// Callers choose the key (client IP, route, user id). Buckets whose window
/// has elapsed are overwritten on next use rather than evicted, so memory
/// is bounded by the number of distinct keys seen; [`sweep`](Self::sweep)
/// and [`start_sweeper`](Self::start_sweeper) exist for long-lived
/// processes that see unbounded key cardinality.
pub struct RateLimiter {
    buckets: std::sync::Arc<DashMap<String, FixedWindow>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self { buckets: std::sync::Arc::new(DashMap::new()) }
    }

    /// Checks and consumes one request from `key`'s window.
    ///
    /// A missing or elapsed bucket starts a fresh window with this request
    /// as its first; otherwise the counter increments until it reaches
    /// `limit`, after which every call in the same window is denied with
    /// `remaining = 0`.
    #[must_use]
    pub fn check(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        let now = Instant::now();

        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| FixedWindow { count: 0, window_ends: now + window });

        if now >= bucket.window_ends {
            // Window elapsed: replace, never merge.
            bucket.count = 0;
            bucket.window_ends = now + window;
        }

        let reset_after = bucket.window_ends.saturating_duration_since(now);

        if bucket.count < limit {
            bucket.count += 1;
            decision(true, limit - bucket.count, reset_after)
        } else {
            decision(false, 0, reset_after)
        }
    }

    /// Removes buckets whose window has already elapsed. Caller-invoked;
    /// nothing schedules this implicitly.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| now < bucket.window_ends);
        before - self.buckets.len()
    }

    /// Spawns a background task sweeping elapsed buckets every `interval`.
    pub fn start_sweeper(&self, interval: Duration) {
        let buckets = self.buckets.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let before = buckets.len();
                buckets.retain(|_, bucket| now < bucket.window_ends);
                let removed = before - buckets.len();
                if removed > 0 {
                    tracing::debug!(removed, "swept elapsed rate limit buckets");
                }
            }
        });
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn decision(allowed: bool, remaining: u32, reset_after: Duration) -> RateDecision {
    RateDecision {
        allowed,
        remaining,
        reset_after,
        reset_at: unix_after(reset_after),
        degraded: false,
    }
}

/// Unix timestamp (seconds) `d` from now.
pub(crate) fn unix_after(d: Duration) -> u64 {
    (SystemTime::now() + d)
        .duration_since(UNIX_EPOCH)
        .map(|t| t.as_secs())
        .unwrap_or_default()
}
