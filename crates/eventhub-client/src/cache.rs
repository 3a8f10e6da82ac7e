//! In-memory response cache with per-entry expiry.
//!
//! Entries are keyed by a resource identifier plus a canonical serialization
//! of the request's query parameters (see [`cache_key`]), so two different
//! parameter sets for the same resource never share an entry.
//!
//! ## Design
//!
//! - **Expiry**: every entry carries an `expires_at` instant. Expired entries
//!   are treated as absent and removed lazily by the lookup that finds them.
//! - **Bounding**: optional. When `max_entries` is set, an insert that would
//!   exceed it first drops expired entries, then the entry closest to expiry.
//! - **Concurrent Access**: backed by `DashMap`, so the cache can be shared
//!   between concurrent requests without an outer lock.
//!
//! ## Example
//!
//! ```ignore
//! let cache: TtlCache<serde_json::Value> = TtlCache::new(Duration::from_secs(300));
//! let key = cache_key("/api/events", &[("page".into(), "2".into())]);
//! if cache.get(&key).is_none() {
//!     cache.set(key, fetched);
//! }
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use regex::Regex;

/// Default time-to-live for cached responses (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Expiry used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Point-in-time view of the cache contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of stored entries, including expired ones not yet collected.
    pub count: usize,
    /// Stored keys, sorted.
    pub keys: Vec<String>,
}

/// Thread-safe TTL cache.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    max_entries: Option<usize>,
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("size", &self.entries.len())
            .field("default_ttl", &self.default_ttl)
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl<V> Default for TtlCache<V>
where
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<V> TtlCache<V>
where
    V: Clone,
{
    /// Creates an unbounded cache with the given default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            max_entries: None,
        }
    }

    /// Caps the number of stored entries.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries.max(1));
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Stores `value` under `key` with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();

        if let Some(max) = self.max_entries
            && !self.entries.contains_key(&key)
            && self.entries.len() >= max
        {
            self.make_room(max);
        }

        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: expiry_after(Instant::now(), ttl),
            },
        );
    }

    /// Returns the value for `key` if present and not expired.
    ///
    /// An expired entry is removed before returning `None`.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                tracing::trace!(key, "cache hit");
                return Some(entry.value.clone());
            }
            // Release the shard read lock before removing
            drop(entry);
            self.entries
                .remove_if(key, |_, entry| entry.is_expired(Instant::now()));
            tracing::trace!(key, "cache entry expired");
        }

        None
    }

    /// Removes `key`. Returns `true` if an entry was stored.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every entry whose key matches `pattern`. Returns the number removed.
    pub fn clear_pattern(&self, pattern: &Regex) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !pattern.is_match(key));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(pattern = pattern.as_str(), removed, "cleared cache entries");
        }
        removed
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drops expired entries. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        CacheStats {
            count: keys.len(),
            keys,
        }
    }

    fn make_room(&self, max: usize) {
        self.cleanup();
        while self.entries.len() >= max {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().expires_at)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Builds a cache key from a resource identifier and its query parameters.
///
/// Parameters are sorted by name (then value) so the same set in a different
/// order maps to the same key, and are serialized as JSON so that values
/// containing separators cannot collide.
pub fn cache_key(resource: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return resource.to_string();
    }

    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, value) in params {
        grouped.entry(name.as_str()).or_default().push(value.as_str());
    }
    for values in grouped.values_mut() {
        values.sort_unstable();
    }

    let serialized = serde_json::to_string(&grouped).unwrap_or_default();
    format!("{resource}?{serialized}")
}
