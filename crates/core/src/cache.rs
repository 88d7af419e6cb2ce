//! Time-bounded result cache.
//!
//! Successful [`ParseResult`]s are kept for a fixed TTL under a key derived
//! from `(url, content type)`. Failed parses are never stored, so a site
//! that is down is retried on every request instead of being remembered as
//! empty.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant as StdInstant};

use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use crate::content::ContentType;
use crate::result::{ParseResult, elapsed_ms};

/// Default lifetime of a cached result.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Lowercase hex SHA-256 of `"{url}|{content_type}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(url: &str, content_type: ContentType) -> Self {
        let digest = Sha256::digest(format!("{url}|{content_type}").as_bytes());
        Self(digest.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keyed storage with per-entry expiry.
pub trait CacheStore: Send + Sync {
    /// The stored value, unless missing or expired.
    fn get(&self, key: &CacheKey) -> Option<ParseResult>;

    fn set(&self, key: CacheKey, value: ParseResult, ttl: Duration);
}

#[derive(Debug)]
struct Entry {
    value: ParseResult,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process [`CacheStore`]. Safe to share between concurrent parses.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included until they are swept.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Drop every expired entry and return how many went.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        sweep(&mut entries, Instant::now())
    }
}

fn sweep(entries: &mut HashMap<CacheKey, Entry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<ParseResult> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            debug!(key = %key, "cache entry expired");
        }
        None
    }

    fn set(&self, key: CacheKey, value: ParseResult, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let swept = sweep(&mut entries, now);
        if swept > 0 {
            debug!(swept, "expired cache entries removed");
        }
        entries.insert(key, Entry { value, expires_at: now + ttl });
    }
}

/// Read-through cache over a [`CacheStore`].
#[derive(Debug)]
pub struct Cache<S> {
    store: S,
    ttl: Duration,
}

impl<S: CacheStore> Cache<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached result for `key`, or run `compute` and keep its
    /// result if it succeeded.
    ///
    /// A hit comes back with `cached` set and `processing_time_ms` replaced
    /// by the time the lookup took; the stored snapshot itself is never
    /// changed.
    pub async fn get_or_compute<F, Fut>(&self, key: &CacheKey, compute: F) -> ParseResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ParseResult>,
    {
        let started = StdInstant::now();
        if let Some(mut hit) = self.store.get(key) {
            hit.cached = true;
            hit.processing_time_ms = elapsed_ms(started);
            debug!(key = %key, url = %hit.url, "cache hit");
            return hit;
        }

        let result = compute().await;
        if result.success {
            self.store.set(key.clone(), result.clone(), self.ttl);
        }
        result
    }
}

impl Default for Cache<MemoryCache> {
    fn default() -> Self {
        Self::new(MemoryCache::new(), DEFAULT_TTL)
    }
}
