//! Short-TTL memoization for preview and module output.
//!
//! Interactive configuration fires the same compose request many times per
//! second; these caches coalesce that burst. They are latency
//! optimizations only: nothing correctness-bearing lives here, entries
//! expire within tens to hundreds of milliseconds, and the whole layer can
//! be disabled (tests run with it off). There is no invalidation API: a
//! changed input hashes to a different key, and stale keys age out.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// Default TTL for memoized preview results.
pub const DEFAULT_PREVIEW_TTL: Duration = Duration::from_millis(100);

/// Default TTL for memoized module fragments.
pub const DEFAULT_FRAGMENT_TTL: Duration = Duration::from_millis(50);

// Bursts are keystroke-driven; a handful of keys is plenty.
const MAX_ENTRIES: usize = 32;

/// Hash any `Hash` value into a cache key.
#[must_use]
pub fn hash_key<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// A tiny TTL cache from `u64` key to a cloneable value.
///
/// `get` never returns expired entries; insertion evicts expired entries
/// first and then, if still full, clears outright (burst caches do not
/// need smarter eviction).
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: HashMap<u64, (Instant, V)>,
    ttl: Duration,
    enabled: bool,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            enabled: true,
        }
    }

    /// Create a disabled cache: `get` always misses, `insert` is a no-op.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::ZERO,
            enabled: false,
        }
    }

    /// Whether memoization is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a live entry.
    pub fn get(&self, key: u64) -> Option<V> {
        if !self.enabled {
            return None;
        }
        self.entries
            .get(&key)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, v)| v.clone())
    }

    /// Store a value under a key.
    pub fn insert(&mut self, key: u64, value: V) {
        if !self.enabled {
            return;
        }
        if self.entries.len() >= MAX_ENTRIES {
            let ttl = self.ttl;
            self.entries.retain(|_, (at, _)| at.elapsed() < ttl);
            if self.entries.len() >= MAX_ENTRIES {
                self.entries.clear();
            }
        }
        self.entries.insert(key, (Instant::now(), value));
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
