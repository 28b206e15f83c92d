//! Seen-key deduplication for retried mutations.
//!
//! A client retrying a mutation supplies the same idempotency key; the
//! store answers whether that key was already processed within its TTL so
//! the caller can skip re-execution. This is a defense-in-depth layer, not
//! an exactly-once guarantee: state is process-local unless the shared
//! store is configured, and it does not survive restarts.

use crate::store::SharedStore;
use dashmap::{mapref::entry::Entry, DashMap};
use std::time::{Duration, Instant};

/// Key prefix in the shared store.
const KEY_PREFIX: &str = "gh:idem:";

struct SeenEntry {
    seen_at: Instant,
    ttl: Duration,
}

impl SeenEntry {
    fn is_live(&self, now: Instant) -> bool {
        now.duration_since(self.seen_at) < self.ttl
    }
}

/// TTL'd seen-key cache, local or backed by the shared store.
///
/// Entries are only purged by [`sweep`](Self::sweep) (or lazily overwritten
/// once expired), so the local map grows with distinct keys seen. Long
/// process lifetimes should schedule the sweeper.
pub struct IdempotencyStore {
    seen: std::sync::Arc<DashMap<String, SeenEntry>>,
    shared: Option<SharedStore>,
}

impl IdempotencyStore {
    /// Builds a local-only store.
    #[must_use]
    pub fn new() -> Self {
        Self { seen: std::sync::Arc::new(DashMap::new()), shared: None }
    }

    /// Builds a store that prefers the shared database and falls back to
    /// the local map when it is unreachable.
    #[must_use]
    pub fn with_shared(shared: SharedStore) -> Self {
        Self { seen: std::sync::Arc::new(DashMap::new()), shared: Some(shared) }
    }

    /// Returns `true` when `key` was already recorded within its TTL;
    /// otherwise records it now and returns `false`.
    ///
    /// This never fails: a shared-store error is logged at debug level and
    /// the local map answers instead.
    pub async fn was_seen_and_record(&self, key: &str, ttl: Duration) -> bool {
        if let Some(store) = &self.shared {
            match store.set_nx_with_ttl(&format!("{KEY_PREFIX}{key}"), ttl).await {
                // Newly set means this is the first sighting.
                Ok(newly_set) => return !newly_set,
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        key,
                        "shared idempotency store unavailable, using local map"
                    );
                }
            }
        }

        self.record_local(key, ttl)
    }

    fn record_local(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();

        match self.seen.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    true
                } else {
                    // Expired entry: lazy overwrite counts as a fresh sighting.
                    occupied.insert(SeenEntry { seen_at: now, ttl });
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(SeenEntry { seen_at: now, ttl });
                false
            }
        }
    }

    /// Removes entries older than their own TTL. Caller-invoked; nothing
    /// schedules this implicitly.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.seen.len();
        self.seen.retain(|_, entry| entry.is_live(now));
        before - self.seen.len()
    }

    /// Spawns a background task sweeping expired entries every `interval`.
    pub fn start_sweeper(&self, interval: Duration) {
        let seen = self.seen.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let before = seen.len();
                seen.retain(|_, entry| entry.is_live(now));
                let removed = before - seen.len();
                if removed > 0 {
                    tracing::debug!(removed, "swept expired idempotency entries");
                }
            }
        });
    }

    /// Number of keys currently held in the local map.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.seen.len()
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}
