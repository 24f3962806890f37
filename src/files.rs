//! Working-set file model.
//!
//! A [`FileEntry`] describes one file under consideration for renaming:
//! its path, original basename, size, and modification time, together with
//! a lifecycle [`FileStatus`]. Entries are immutable; a status transition
//! produces a new value rather than mutating in place, so a preview cycle
//! can never observe a half-updated entry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifecycle status of a file in the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Loaded into the working set, metadata not yet requested.
    Pending,
    /// Metadata has been loaded (or determined to be unnecessary).
    Loaded,
    /// The candidate new name passed validation.
    Validated,
    /// The file was renamed on disk.
    Renamed,
    /// A per-file error occurred (extraction, validation, or rename).
    Error,
}

/// Modification-time + size fingerprint used for cache invalidation.
///
/// A cached metadata record is only trusted while the file's current
/// fingerprint equals the one stored alongside the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_ns: i64,
    /// File size in bytes.
    pub size: u64,
}

impl Fingerprint {
    /// Build a fingerprint from a modification time and size.
    #[must_use]
    pub fn new(modified: SystemTime, size: u64) -> Self {
        let mtime_ns = match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
            // Pre-epoch mtimes exist on some filesystems; store as negative offset
            Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
        };
        Self { mtime_ns, size }
    }

    /// Read the current fingerprint of a file from disk.
    pub fn of(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self::new(
            meta.modified().unwrap_or(UNIX_EPOCH),
            meta.len(),
        ))
    }
}

/// One file in the current rename batch.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path to the file.
    pub path: PathBuf,
    /// Original basename (filename component) at load time.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// Lifecycle status.
    pub status: FileStatus,
    /// Error message when `status` is [`FileStatus::Error`].
    pub error: Option<String>,
}

impl FileEntry {
    /// Create an entry from known attributes.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            size,
            modified,
            status: FileStatus::Pending,
            error: None,
        }
    }

    /// Create an entry by stat-ing `path`.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        Ok(Self::new(
            path.to_path_buf(),
            meta.len(),
            meta.modified().unwrap_or(UNIX_EPOCH),
        ))
    }

    /// The entry's cache-invalidation fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(self.modified, self.size)
    }

    /// The basename without its final extension.
    #[must_use]
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            // A leading dot is a hidden-file prefix, not an extension separator
            Some(0) | None => &self.name,
            Some(idx) => &self.name[..idx],
        }
    }

    /// The final extension including the leading dot, or `""`.
    #[must_use]
    pub fn extension(&self) -> &str {
        match self.name.rfind('.') {
            Some(0) | None => "",
            Some(idx) => &self.name[idx..],
        }
    }

    /// Return a copy with a new status.
    #[must_use]
    pub fn with_status(&self, status: FileStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Return a copy marked as failed with a message.
    #[must_use]
    pub fn with_error(&self, message: impl Into<String>) -> Self {
        Self {
            status: FileStatus::Error,
            error: Some(message.into()),
            ..self.clone()
        }
    }
}
