//! Metadata extraction subsystem.
//!
//! This module defines the data model for extracted file metadata and the
//! seam between the rest of the crate and the external extraction tool:
//!
//! * [`extractor`]: adapter around a long-lived `exiftool` process.
//! * [`loader`]: cache-first streaming batch loader.
//!
//! The [`MetadataSource`] trait is the injection point: the engine and the
//! loader only ever see the trait, so tests substitute in-memory sources and
//! never touch a subprocess.

pub mod extractor;
pub mod loader;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use extractor::{force_cleanup_all, ExifTool, ExifToolConfig};
pub use loader::{LoadStats, LoadedMetadata, LoaderConfig, MetadataLoader};

/// How much metadata to extract.
///
/// Fast mode goes through the persistent extractor process. Extended mode
/// needs flags the persistent process's structured-output mode does not
/// support, so it always runs as a one-shot invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtractionMode {
    /// Common fields only (stay-open process).
    Fast,
    /// Full field set including embedded/composite data (one-shot process).
    Extended,
}

impl ExtractionMode {
    /// Whether a record extracted in `self` mode satisfies a request for
    /// `requested` mode. Extended covers Fast, not the other way around.
    #[must_use]
    pub fn covers(self, requested: ExtractionMode) -> bool {
        self >= requested
    }
}

/// Extracted metadata for one file: a field-name to value mapping plus the
/// mode it was extracted under and when.
///
/// Records are plain values; the cache owns the authoritative copies and
/// hands out clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    fields: BTreeMap<String, String>,
    /// Extraction mode this record was produced under.
    pub mode: ExtractionMode,
    /// When extraction happened.
    pub extracted_at: DateTime<Utc>,
}

impl MetadataRecord {
    /// Create a record from extracted fields.
    #[must_use]
    pub fn new(fields: BTreeMap<String, String>, mode: ExtractionMode) -> Self {
        Self {
            fields,
            mode,
            extracted_at: Utc::now(),
        }
    }

    /// An empty record, used as the stand-in for failed extractions.
    #[must_use]
    pub fn empty(mode: ExtractionMode) -> Self {
        Self::new(BTreeMap::new(), mode)
    }

    /// Look up a field value by name.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Whether the record carries no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterate over `(field, value)` pairs in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Errors that can occur while extracting metadata for a single file.
///
/// These are always per-file: a batch never fails as a whole because one
/// file could not be read by the external tool.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ExtractError {
    /// The extractor binary could not be started.
    #[error("failed to start extractor process: {0}")]
    Spawn(String),

    /// The extractor process died or its streams closed mid-exchange.
    #[error("extractor process failed: {0}")]
    ProcessFailed(String),

    /// No response within the configured timeout.
    #[error("extraction timed out after {seconds}s: {path}")]
    Timeout {
        /// File whose extraction timed out.
        path: PathBuf,
        /// Timeout that was exceeded.
        seconds: u64,
    },

    /// The tool produced output we could not parse.
    #[error("malformed extractor output for {path}: {message}")]
    Malformed {
        /// File the bad output was for.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// The tool returned no entry for the requested file.
    #[error("no metadata returned for {0}")]
    Missing(PathBuf),
}

/// A source of file metadata.
///
/// Implemented by [`ExifTool`] over a real subprocess and by in-memory
/// mocks in tests. All methods take `&self`; implementations serialize
/// internally where they wrap a single shared process.
pub trait MetadataSource: Send + Sync {
    /// Extract metadata for one file.
    fn extract_one(&self, path: &Path, mode: ExtractionMode)
        -> Result<MetadataRecord, ExtractError>;

    /// Extract metadata for a batch of files.
    ///
    /// Returns one result per input path. Partial failure is normal:
    /// a failing file gets an `Err` entry, the rest succeed.
    fn extract_batch(
        &self,
        paths: &[PathBuf],
        mode: ExtractionMode,
    ) -> Vec<(PathBuf, Result<MetadataRecord, ExtractError>)> {
        paths
            .iter()
            .map(|p| (p.clone(), self.extract_one(p, mode)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_covers() {
        assert!(ExtractionMode::Extended.covers(ExtractionMode::Fast));
        assert!(ExtractionMode::Fast.covers(ExtractionMode::Fast));
        assert!(!ExtractionMode::Fast.covers(ExtractionMode::Extended));
    }

    #[test]
    fn test_record_lookup() {
        let mut fields = BTreeMap::new();
        fields.insert("Model".to_string(), "X100V".to_string());
        let record = MetadataRecord::new(fields, ExtractionMode::Fast);

        assert_eq!(record.get("Model"), Some("X100V"));
        assert_eq!(record.get("ISO"), None);
        assert!(!record.is_empty());
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_empty_record() {
        let record = MetadataRecord::empty(ExtractionMode::Extended);
        assert!(record.is_empty());
        assert_eq!(record.mode, ExtractionMode::Extended);
    }

    #[test]
    fn test_record_roundtrips_through_json() {
        let mut fields = BTreeMap::new();
        fields.insert("DateTimeOriginal".to_string(), "2024:05:01 10:00:00".to_string());
        let record = MetadataRecord::new(fields, ExtractionMode::Fast);

        let json = serde_json::to_string(&record).unwrap();
        let back: MetadataRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
