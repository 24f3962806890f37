//! Two-tier metadata cache.
//!
//! Serves metadata lookups with cache-first semantics across two tiers:
//!
//! * [`memory`]: in-process LRU, session-scoped, bounded entry count.
//! * [`database`]: SQLite-backed persistent store, survives restarts.
//!
//! # Cache Invalidation
//!
//! Entries are validated by fingerprint: modification time (nanoseconds)
//! plus file size, captured at extraction time. If either changes, the
//! stored entry is stale and the lookup is a miss and the caller re-extracts.
//! A record extracted in fast mode additionally never satisfies an
//! extended-mode request.
//!
//! A persistent-tier hit is promoted into the memory tier so the rest of
//! the session hits RAM.

pub mod database;
pub mod entry;
pub mod memory;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub use database::{CacheError, CacheResult, MetadataDb};
pub use entry::CacheEntry;
pub use memory::MemoryCache;

use crate::files::Fingerprint;
use crate::metadata::{ExtractionMode, MetadataRecord};
use crate::path_utils::path_key;

/// Default bound for the memory tier. Roughly a few MB of field data;
/// tunable through [`crate::config::Config`].
pub const DEFAULT_MEMORY_CAPACITY: usize = 1000;

/// Hit/miss counters for one cache instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the memory tier.
    pub memory_hits: u64,
    /// Lookups answered from the persistent tier (and promoted).
    pub persistent_hits: u64,
    /// Lookups with no stored entry at all.
    pub misses: u64,
    /// Lookups where a stored entry existed but its fingerprint or mode
    /// no longer matched.
    pub stale: u64,
}

impl CacheStats {
    /// Total lookups observed.
    #[must_use]
    pub fn lookups(&self) -> u64 {
        self.memory_hits + self.persistent_hits + self.misses + self.stale
    }
}

/// Two-tier metadata cache: bounded LRU in front of a SQLite store.
///
/// Constructed with or without the persistent tier; without it (tests,
/// `--no-cache`) the memory tier still works for the session.
pub struct MetadataCache {
    memory: Mutex<MemoryCache>,
    db: Option<MetadataDb>,
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
}

impl MetadataCache {
    /// Create a cache backed by the SQLite store at `db_path`.
    pub fn open(db_path: &Path, memory_capacity: usize) -> CacheResult<Self> {
        Ok(Self::build(Some(MetadataDb::open(db_path)?), memory_capacity))
    }

    /// Create a memory-only cache (no persistence).
    #[must_use]
    pub fn memory_only(memory_capacity: usize) -> Self {
        Self::build(None, memory_capacity)
    }

    fn build(db: Option<MetadataDb>, memory_capacity: usize) -> Self {
        Self {
            memory: Mutex::new(MemoryCache::new(memory_capacity)),
            db,
            memory_hits: AtomicU64::new(0),
            persistent_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale: AtomicU64::new(0),
        }
    }

    /// Look up metadata for `path`.
    ///
    /// `current` is the file's fingerprint right now; a stored entry whose
    /// fingerprint differs (or whose extraction mode does not cover
    /// `requested`) is treated as a miss. Persistent hits are promoted
    /// into the memory tier.
    pub fn get(
        &self,
        path: &Path,
        current: &Fingerprint,
        requested: ExtractionMode,
    ) -> Option<MetadataRecord> {
        let key = path_key(path);

        {
            let mut memory = self.memory.lock().unwrap();
            if let Some(entry) = memory.get(&key) {
                if entry.is_valid_for(current, requested) {
                    self.memory_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.record.clone());
                }
                // Stale in memory implies stale on disk too (write-through)
                memory.remove(&key);
                self.stale.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        let Some(db) = &self.db else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        match db.get(&key) {
            Ok(Some(entry)) => {
                if entry.is_valid_for(current, requested) {
                    self.persistent_hits.fetch_add(1, Ordering::Relaxed);
                    let record = entry.record.clone();
                    self.memory.lock().unwrap().insert(key, entry);
                    Some(record)
                } else {
                    self.stale.fetch_add(1, Ordering::Relaxed);
                    None
                }
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                // A broken cache must never break extraction
                log::warn!("persistent cache lookup failed for {key}: {e}");
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Write a record through both tiers.
    pub fn put(&self, path: &Path, fingerprint: Fingerprint, record: MetadataRecord) {
        let key = path_key(path);
        let entry = CacheEntry::new(key.clone(), record, fingerprint);

        if let Some(db) = &self.db {
            if let Err(e) = db.put(&entry) {
                log::warn!("persistent cache write failed for {key}: {e}");
            }
        }
        self.memory.lock().unwrap().insert(key, entry);
    }

    /// Drop any stored entry for `path` from both tiers.
    pub fn invalidate(&self, path: &Path) {
        let key = path_key(path);
        self.memory.lock().unwrap().remove(&key);
        if let Some(db) = &self.db {
            if let Err(e) = db.invalidate(&key) {
                log::warn!("persistent cache invalidate failed for {key}: {e}");
            }
        }
    }

    /// Clear both tiers. Returns the number of persistent entries removed.
    pub fn clear(&self) -> CacheResult<usize> {
        self.memory.lock().unwrap().clear();
        match &self.db {
            Some(db) => db.clear(),
            None => Ok(0),
        }
    }

    /// Whether a persistent tier is attached.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    /// Snapshot of the hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            persistent_hits: self.persistent_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
        }
    }
}
