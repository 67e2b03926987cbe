//! Token identity cache — a bounded, TTL-ed map from token hash to the
//! identity it resolved to.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::cache::CacheStats;
use crate::identity::Identity;

struct Entry {
    identity: Identity,
    expires_at: SystemTime,
}

/// Sharded, concurrency-safe cache from token hash to resolved identity.
///
/// Readers proceed in parallel against `DashMap`'s internal shards; a
/// lookup on one shard never waits on an insertion into another.
pub struct TokenCache {
    entries: DashMap<String, Entry>,
    ttl: Duration,
    max_size: usize,
    stats: CacheStats,
}

impl TokenCache {
    /// Construct a cache with the given configured TTL and capacity.
    #[must_use]
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_size,
            stats: CacheStats::default(),
        }
    }

    /// Hash a raw token to its cache key. Never returns or logs the raw
    /// token itself.
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        hex::encode(digest)
    }

    /// Insert the identity resolved for `token`, expiring no later than
    /// `exp_unix_secs`. If the effective TTL (the lesser of the configured
    /// TTL and the time remaining until `exp_unix_secs`) is not positive,
    /// the entry is not cached.
    pub fn insert(&self, token: &str, identity: Identity, exp_unix_secs: u64) {
        let now = SystemTime::now();
        let now_secs = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let Some(remaining) = exp_unix_secs.checked_sub(now_secs).filter(|r| *r > 0) else {
            return;
        };
        let effective_ttl = self.ttl.min(Duration::from_secs(remaining));
        if effective_ttl.is_zero() {
            return;
        }

        let key = Self::hash_token(token);
        let expires_at = now + effective_ttl;

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict_to_make_room(now);
        }

        self.entries.insert(key.clone(), Entry { identity, expires_at });
        debug!(token_hash = %key, "inserted token cache entry");
    }

    /// Look up the identity for `token`. Returns `None` if absent or
    /// expired; an expired hit is lazily removed.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<Identity> {
        let key = Self::hash_token(token);
        let now = SystemTime::now();

        if let Some(entry) = self.entries.get(&key) {
            if entry.expires_at > now {
                let identity = entry.identity.clone();
                drop(entry);
                debug!(token_hash = %key, "token cache hit");
                self.stats.record_hit();
                return Some(identity);
            }
        }

        if self.entries.remove(&key).is_some() {
            self.stats.record_eviction(1);
        }
        debug!(token_hash = %key, "token cache miss");
        self.stats.record_miss();
        None
    }

    /// Cumulative hit/miss/eviction counters.
    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Evict expired entries first; if still at capacity, evict the single
    /// entry with the earliest expiry.
    fn evict_to_make_room(&self, now: SystemTime) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().expires_at <= now)
            .map(|e| e.key().clone())
            .collect();

        if !expired.is_empty() {
            let count = expired.len() as u64;
            for key in expired {
                self.entries.remove(&key);
            }
            self.stats.record_eviction(count);
            debug!(count, "evicted expired token cache entries");
            return;
        }

        if self.entries.len() < self.max_size {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().expires_at)
            .map(|e| e.key().clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.stats.record_eviction(1);
            debug!(token_hash = %key, "evicted earliest-expiry token cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claims;
    use crate::identity::IdentityType;

    fn identity(id: &str) -> Identity {
        Identity::basic(id, IdentityType::Service, Claims::new()).unwrap()
    }

    fn unix_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn insert_then_get_is_a_hit() {
        let cache = TokenCache::new(Duration::from_secs(60), 10);
        cache.insert("tok-1", identity("id-1"), unix_now() + 300);

        assert_eq!(cache.get("tok-1").map(|i| i.id().to_string()), Some("id-1".to_string()));
        assert_eq!(cache.stats().hits(), 1);
    }

    #[test]
    fn get_on_unknown_token_is_a_miss() {
        let cache = TokenCache::new(Duration::from_secs(60), 10);
        assert!(cache.get("never-inserted").is_none());
        assert_eq!(cache.stats().misses(), 1);
    }

    #[test]
    fn effective_ttl_is_capped_by_token_expiry() {
        // GIVEN: a configured TTL of 60s but a token that expires in 1s
        let cache = TokenCache::new(Duration::from_secs(60), 10);
        cache.insert("tok-1", identity("id-1"), unix_now() + 1);

        // THEN: the entry is cached (effective TTL still positive)
        assert!(cache.get("tok-1").is_some());
    }

    #[test]
    fn non_positive_effective_ttl_is_not_cached() {
        // GIVEN: a token that is already expired
        let cache = TokenCache::new(Duration::from_secs(60), 10);
        cache.insert("tok-1", identity("id-1"), unix_now().saturating_sub(5));

        // THEN: nothing was cached
        assert!(cache.get("tok-1").is_none());
    }

    #[test]
    fn eviction_prefers_expired_entries_over_earliest_expiry() {
        let cache = TokenCache::new(Duration::from_secs(3600), 2);
        // One entry with a TTL so short it is already expired by the time
        // we insert the third.
        cache.insert("expired", identity("a"), unix_now() + 1);
        std::thread::sleep(Duration::from_millis(1100));
        cache.insert("fresh", identity("b"), unix_now() + 3600);

        // WHEN: inserting a third entry while at capacity
        cache.insert("newest", identity("c"), unix_now() + 3600);

        // THEN: the expired entry was evicted, not the fresh one
        assert!(cache.get("fresh").is_some());
        assert!(cache.get("newest").is_some());
    }

    #[test]
    fn hash_token_never_exposes_the_raw_token() {
        let hashed = TokenCache::hash_token("super-secret-token");
        assert_ne!(hashed, "super-secret-token");
        assert_eq!(hashed.len(), 64); // sha256 hex digest
    }
}
