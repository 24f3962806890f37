//! Cache entry definitions.

use serde::{Deserialize, Serialize};

use crate::files::Fingerprint;
use crate::metadata::{ExtractionMode, MetadataRecord};

/// One cached metadata record together with the fingerprint of the file it
/// was extracted from.
///
/// A stored entry is only trusted while the file's current fingerprint
/// equals [`CacheEntry::fingerprint`]; any mtime or size change makes the
/// entry stale and the next lookup a miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// NFC-normalized absolute path (cache key).
    pub path: String,
    /// The cached metadata.
    pub record: MetadataRecord,
    /// mtime + size of the file at extraction time.
    pub fingerprint: Fingerprint,
}

impl CacheEntry {
    /// Create a new entry.
    #[must_use]
    pub fn new(path: String, record: MetadataRecord, fingerprint: Fingerprint) -> Self {
        Self {
            path,
            record,
            fingerprint,
        }
    }

    /// Whether this entry is still valid for a file with `current`
    /// fingerprint and a request in `requested` mode.
    ///
    /// Both conditions must hold: the on-disk file is unchanged, and the
    /// stored record was extracted in a mode that covers the request
    /// (a fast record never satisfies an extended request).
    #[must_use]
    pub fn is_valid_for(&self, current: &Fingerprint, requested: ExtractionMode) -> bool {
        self.fingerprint == *current && self.record.mode.covers(requested)
    }
}

// Fingerprint lives in files.rs but is serialized inside cache rows, so the
// serde impls are kept here with the storage concern.
impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.mtime_ns, self.size).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (mtime_ns, size) = <(i64, u64)>::deserialize(deserializer)?;
        Ok(Self { mtime_ns, size })
    }
}
