//! Content-addressed result cache.
//!
//! Keys are SHA-256 fingerprints over the normalized ticket text, the prompt
//! version and the taxonomy version, so any prompt or taxonomy change
//! invalidates earlier results. Concurrent misses for the same key may both
//! call the model; there is no single-flight.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::TriageResult;

use super::clock::Clock;
use super::lock;

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Turn caching off entirely
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Entry lifetime in seconds (default: 86400 = 24h)
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Upper bound on stored entries (default: 10 000)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_enabled() -> bool {
    true
}
fn default_ttl_seconds() -> u64 {
    86_400
}
fn default_max_entries() -> usize {
    10_000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_seconds: default_ttl_seconds(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a ticket for a given prompt and taxonomy version
    pub fn compute(text: &str, prompt_version: &str, taxonomy_version: &str) -> Self {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

        let mut hasher = Sha256::new();
        hasher.update(prompt_version.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(taxonomy_version.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(normalized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough for logs
        f.write_str(&self.0[..16.min(self.0.len())])
    }
}

/// Storage behind the pipeline's cache lookups
pub trait ResultCache: Send + Sync {
    /// Return a live (unexpired) result for `key`
    fn lookup(&self, key: &Fingerprint) -> Option<TriageResult>;

    /// Store a result; failures are non-fatal to the caller
    fn store(&self, key: Fingerprint, result: TriageResult, ttl: Duration) -> Result<(), CacheError>;
}

/// Cache store failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache is disabled")]
    Disabled,

    #[error("Cache backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: TriageResult,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }
}

/// In-process cache with TTL expiry and a capacity bound
#[derive(Debug)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            clock,
        }
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for InMemoryCache {
    fn lookup(&self, key: &Fingerprint) -> Option<TriageResult> {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.result.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: Fingerprint, result: TriageResult, ttl: Duration) -> Result<(), CacheError> {
        if self.max_entries == 0 {
            return Err(CacheError::Disabled);
        }

        let now = self.clock.now();
        let mut entries = lock(&self.entries);

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, entry| !entry.is_expired(now));

            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.created_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                result,
                created_at: now,
                ttl,
            },
        );
        Ok(())
    }
}

/// Cache that never stores anything (caching disabled)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl ResultCache for NoopCache {
    fn lookup(&self, _key: &Fingerprint) -> Option<TriageResult> {
        None
    }

    fn store(&self, _key: Fingerprint, _result: TriageResult, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::domain::Taxonomy;

    fn result(id: &str) -> TriageResult {
        TriageResult::degraded(id, &Taxonomy::default(), "summary", 10, 5)
    }

    #[test]
    fn test_fingerprint_normalizes_whitespace() {
        let a = Fingerprint::compute("hello   world\n", "v1", "v1");
        let b = Fingerprint::compute("  hello world", "v1", "v1");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_includes_versions() {
        let base = Fingerprint::compute("hello", "v1", "v1");
        assert_ne!(base, Fingerprint::compute("hello", "v2", "v1"));
        assert_ne!(base, Fingerprint::compute("hello", "v1", "v2"));
        assert_ne!(base, Fingerprint::compute("Hello", "v1", "v1"));
    }

    #[test]
    fn test_lookup_and_expiry() {
        let clock = Arc::new(ManualClock::new());
        let cache = InMemoryCache::new(10, clock.clone());
        let key = Fingerprint::compute("ticket", "v1", "v1");

        assert!(cache.lookup(&key).is_none());
        cache
            .store(key.clone(), result("a"), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.lookup(&key).unwrap().request_id, "a");

        clock.advance(Duration::from_secs(59));
        assert!(cache.lookup(&key).is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.lookup(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_expired_then_oldest() {
        let clock = Arc::new(ManualClock::new());
        let cache = InMemoryCache::new(2, clock.clone());
        let k1 = Fingerprint::compute("one", "v1", "v1");
        let k2 = Fingerprint::compute("two", "v1", "v1");
        let k3 = Fingerprint::compute("three", "v1", "v1");

        cache.store(k1.clone(), result("1"), Duration::from_secs(100)).unwrap();
        clock.advance(Duration::from_secs(1));
        cache.store(k2.clone(), result("2"), Duration::from_secs(100)).unwrap();
        clock.advance(Duration::from_secs(1));
        cache.store(k3.clone(), result("3"), Duration::from_secs(100)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&k1).is_none());
        assert!(cache.lookup(&k2).is_some());
        assert!(cache.lookup(&k3).is_some());
    }

    #[test]
    fn test_overflow_drops_expired_before_oldest() {
        let clock = Arc::new(ManualClock::new());
        let cache = InMemoryCache::new(2, clock.clone());
        let short = Fingerprint::compute("a", "v1", "v1");
        let long = Fingerprint::compute("b", "v1", "v1");
        let fresh = Fingerprint::compute("c", "v1", "v1");

        cache.store(long.clone(), result("b"), Duration::from_secs(100)).unwrap();
        clock.advance(Duration::from_secs(1));
        cache.store(short.clone(), result("a"), Duration::from_secs(1)).unwrap();

        clock.advance(Duration::from_secs(5));
        cache.store(fresh.clone(), result("c"), Duration::from_secs(100)).unwrap();

        // The older but still live entry survives
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&long).is_some());
        assert!(cache.lookup(&fresh).is_some());
        assert!(cache.lookup(&short).is_none());
    }

    #[test]
    fn test_noop_cache() {
        let cache = NoopCache;
        let key = Fingerprint::compute("a", "v1", "v1");
        assert_eq!(
            cache.store(key.clone(), result("a"), Duration::from_secs(1)),
            Err(CacheError::Disabled)
        );
        assert!(cache.lookup(&key).is_none());
    }
}
