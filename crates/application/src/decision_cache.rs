use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rankguard_domain::PermissionId;

#[derive(Debug, Clone, Copy)]
struct DecisionEntry {
    allowed: bool,
    expires_at: Instant,
}

/// Hit and miss counters of the decision cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecisionCacheStats {
    /// Live and not yet swept entries.
    pub entries: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to the resolver.
    pub misses: u64,
}

/// Per-user TTL memoization of permission decisions.
///
/// Entries are not purged on invalidation events, so a decision may be stale for up
/// to one TTL after a permission change.
pub struct DecisionCache {
    entries: DashMap<(u64, PermissionId), DecisionEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    /// Creates a cache; a zero `ttl` disables caching.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the configured time-to-live.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a cached, unexpired decision.
    pub fn get(&self, user_id: u64, permission_id: PermissionId) -> Option<bool> {
        let key = (user_id, permission_id);
        let now = Instant::now();

        let cached = self
            .entries
            .get(&key)
            .map(|entry| (entry.allowed, entry.expires_at));

        match cached {
            Some((allowed, expires_at)) if expires_at > now => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(allowed)
            }
            Some(_) => {
                self.entries
                    .remove_if(&key, |_, entry| entry.expires_at <= now);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a decision for one TTL.
    pub fn insert(&self, user_id: u64, permission_id: PermissionId, allowed: bool) {
        if self.ttl.is_zero() {
            return;
        }

        let now = Instant::now();
        let expires_at = now.checked_add(self.ttl).unwrap_or(now);
        self.entries.insert(
            (user_id, permission_id),
            DecisionEntry {
                allowed,
                expires_at,
            },
        );
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Returns current counters.
    #[must_use]
    pub fn stats(&self) -> DecisionCacheStats {
        DecisionCacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
