//! # TTL Cache
//! Per-provider in-memory key/value store with absolute expiry.
//!
//! - Entries carry `cached_at` and `expires_at` taken from the injected [`Clock`].
//! - `get` evicts lazily: an expired entry is removed on the lookup that finds it.
//! - `sweep_expired` and `clear` are explicit maintenance operations.
//! - A zero TTL stores nothing, so `expires_at > cached_at` always holds.
//!
//! Each provider owns its caches; nothing here is shared across providers.

use crate::clock::SharedClock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Default time-to-live for cached provider payloads.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe TTL cache keyed by deterministic request keys.
pub struct TtlCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    default_ttl: Duration,
    clock: SharedClock,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(default_ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            clock,
        }
    }

    /// Value for `key` if present and not yet expired.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let mut map = self.lock();
        match map.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store `value` under `key`. `ttl` overrides the cache default.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return;
        };
        if ttl <= chrono::Duration::zero() {
            return;
        }
        let now = self.clock.now();
        let entry = CacheEntry {
            value,
            cached_at: now,
            expires_at: now + ttl,
        };
        self.lock().insert(key.into(), entry);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, e| !e.is_expired(now));
        before - map.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries, expired ones included until touched or swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl<T> std::fmt::Debug for TtlCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}
