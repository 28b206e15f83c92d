//! Rate limiting against the shared counter store, with silent fallback.
//!
//! When several instances serve the same clients, the fixed-window counter
//! lives in the shared store so the limit is enforced fleet-wide. The store
//! is advisory: any failure to reach it (unconfigured, connection error,
//! timeout) degrades to the local single-process window. Callers never see
//! the difference beyond the `degraded` flag on the decision.

use super::{unix_after, RateDecision, RateLimiter};
use crate::store::SharedStore;
use std::time::Duration;

/// Key prefix in the shared store, keeping rate counters apart from
/// idempotency entries on a shared database.
const KEY_PREFIX: &str = "gh:rate:";

/// Rate limiter that prefers the shared counter store and falls back to a
/// local fixed window.
pub struct DistributedRateLimiter {
    shared: Option<SharedStore>,
    local: RateLimiter,
}

impl DistributedRateLimiter {
    /// Builds a limiter. `shared` being `None` means local-only mode, which
    /// is not considered degraded.
    #[must_use]
    pub fn new(shared: Option<SharedStore>) -> Self {
        Self { shared, local: RateLimiter::new() }
    }

    /// The local fallback limiter, exposed for sweeping.
    #[must_use]
    pub fn local(&self) -> &RateLimiter {
        &self.local
    }

    /// Checks and consumes one request from `key`'s window.
    ///
    /// This never fails: a shared-store error is logged at debug level and
    /// the local window answers instead, with `degraded` set on the
    /// decision.
    pub async fn check(&self, key: &str, limit: u32, window: Duration) -> RateDecision {
        if let Some(store) = &self.shared {
            match Self::check_shared(store, key, limit, window).await {
                Ok(decision) => return decision,
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        key,
                        "shared rate limit store unavailable, using local window"
                    );
                }
            }

            let mut decision = self.local.check(key, limit, window);
            decision.degraded = true;
            return decision;
        }

        self.local.check(key, limit, window)
    }

    async fn check_shared(
        store: &SharedStore,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateDecision, crate::store::StoreError> {
        let counted = store.incr_with_ttl(&format!("{KEY_PREFIX}{key}"), window).await?;

        let allowed = counted.count <= i64::from(limit);
        let remaining = if allowed {
            u32::try_from(i64::from(limit) - counted.count).unwrap_or(0)
        } else {
            0
        };

        Ok(RateDecision {
            allowed,
            remaining,
            reset_after: counted.ttl,
            reset_at: unix_after(counted.ttl),
            degraded: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_only_mode_is_not_degraded() {
        let limiter = DistributedRateLimiter::new(None);

        let decision = limiter.check("k", 2, Duration::from_secs(1)).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert!(!decision.degraded);
    }

    #[tokio::test]
    async fn test_unreachable_store_degrades_silently() {
        // Store connected lazily against a black-hole address: every command
        // times out, so each check must fall back to the local window
        // without erroring.
        let store = SharedStore::connect("redis://192.0.2.1:6379/0", Duration::from_millis(100))
            .await
            .ok();

        // The handshake itself may refuse; local-only is then exercised by
        // the other test. Only assert fallback when a lazy handle exists.
        let Some(store) = store else { return };
        let limiter = DistributedRateLimiter::new(Some(store));

        let first = limiter.check("k", 2, Duration::from_secs(1)).await;
        assert!(first.allowed);
        assert!(first.degraded);

        let second = limiter.check("k", 2, Duration::from_secs(1)).await;
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = limiter.check("k", 2, Duration::from_secs(1)).await;
        assert!(!third.allowed);
    }

    #[tokio::test]
    async fn test_fallback_preserves_fixed_window_semantics() {
        let limiter = DistributedRateLimiter::new(None);

        let mut seen = Vec::new();
        for _ in 0..3 {
            let d = limiter.check("k", 2, Duration::from_secs(1)).await;
            seen.push((d.allowed, d.remaining));
        }

        assert_eq!(seen, vec![(true, 1), (true, 0), (false, 0)]);
    }
}
