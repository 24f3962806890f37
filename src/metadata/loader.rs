//! Cache-first streaming batch metadata loader.
//!
//! For each file in a batch the loader checks the two-tier cache first and
//! yields hits immediately; misses are dispatched to the
//! [`MetadataSource`] in chunks on rayon workers and yielded as each chunk
//! completes, in completion order. The caller gets an iterator and can
//! start consuming results while extraction is still running, so a long load
//! never blocks the whole batch behind its slowest file.
//!
//! The external process itself serializes exchanges internally, so worker
//! parallelism here overlaps request preparation, cache writes, and I/O
//! rather than the exchanges themselves.
//!
//! # Failure and cancellation
//!
//! A failed extraction yields that file with empty metadata and the error
//! attached; the rest of the batch is unaffected. Cancellation is
//! cooperative: the shutdown flag is checked between chunks, never
//! mid-file, and already-yielded results stay usable.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use crate::cache::MetadataCache;
use crate::files::{FileEntry, FileStatus};
use crate::progress::ProgressCallback;

use super::{ExtractError, ExtractionMode, MetadataRecord, MetadataSource};

/// Default number of files per extraction exchange.
///
/// Batch exchanges amortize process round-trips; small chunks keep a
/// timeout or crash from poisoning too many files at once.
pub const DEFAULT_CHUNK_SIZE: usize = 8;

/// Configuration for batch loads.
#[derive(Clone, Default)]
pub struct LoaderConfig {
    /// Files per extraction exchange (0 means [`DEFAULT_CHUNK_SIZE`]).
    pub chunk_size: usize,
    /// Optional cooperative cancellation flag.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl LoaderConfig {
    /// Set the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the shutdown flag for cooperative cancellation.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

impl std::fmt::Debug for LoaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderConfig")
            .field("chunk_size", &self.chunk_size)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

/// One yielded result of a batch load.
#[derive(Debug, Clone)]
pub struct LoadedMetadata {
    /// The input entry with its status advanced to `Loaded` or `Error`.
    pub file: FileEntry,
    /// Extracted (or cached) metadata; empty when extraction failed.
    pub record: MetadataRecord,
    /// The per-file extraction error, if any.
    pub error: Option<ExtractError>,
}

impl LoadedMetadata {
    /// Whether metadata was actually obtained.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Statistics from one batch load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Files requested.
    pub requested: usize,
    /// Cache hits (either tier).
    pub cache_hits: usize,
    /// Files sent to the extractor.
    pub extracted: usize,
    /// Per-file extraction failures.
    pub failed: usize,
    /// Whether the load was interrupted before completing.
    pub interrupted: bool,
}

/// Streaming iterator over batch-load results.
///
/// Yields exactly one [`LoadedMetadata`] per input file unless the load is
/// cancelled, in which case it ends early after the current chunk.
pub struct BatchLoad {
    rx: Receiver<LoadedMetadata>,
}

impl Iterator for BatchLoad {
    type Item = LoadedMetadata;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

/// Coordinates cache lookups and extractor dispatch for file batches.
pub struct MetadataLoader {
    cache: Arc<MetadataCache>,
    source: Arc<dyn MetadataSource>,
}

impl MetadataLoader {
    /// Create a loader over a cache and a metadata source.
    ///
    /// Both are injected so tests can run against mock sources and
    /// memory-only caches.
    #[must_use]
    pub fn new(cache: Arc<MetadataCache>, source: Arc<dyn MetadataSource>) -> Self {
        Self { cache, source }
    }

    /// Load metadata for a batch, yielding results as they become
    /// available (cache hits first, then extractions in completion order).
    ///
    /// The returned iterator ends once every file has been yielded or the
    /// shutdown flag was observed between chunks.
    pub fn load_batch(
        &self,
        files: &[FileEntry],
        mode: ExtractionMode,
        config: &LoaderConfig,
    ) -> BatchLoad {
        let chunk_size = if config.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            config.chunk_size
        };

        let (tx, rx) = mpsc::channel();

        if let Some(cb) = &config.progress_callback {
            cb.on_phase_start("metadata", files.len());
        }

        // Cache pass: hits yield immediately, misses queue for extraction
        let mut misses: Vec<FileEntry> = Vec::new();
        let mut done = 0usize;
        for file in files {
            if let Some(record) = self.cache.get(&file.path, &file.fingerprint(), mode) {
                done += 1;
                if let Some(cb) = &config.progress_callback {
                    cb.on_progress(done, &file.name);
                }
                let _ = tx.send(LoadedMetadata {
                    file: file.with_status(FileStatus::Loaded),
                    record,
                    error: None,
                });
            } else {
                misses.push(file.clone());
            }
        }
        log::debug!(
            "batch load: {} files, {} cache hits, {} to extract",
            files.len(),
            done,
            misses.len()
        );

        if misses.is_empty() {
            if let Some(cb) = &config.progress_callback {
                cb.on_phase_end("metadata");
            }
            return BatchLoad { rx };
        }

        // Extraction pass runs on rayon workers; results stream back over
        // the channel in completion order.
        let cache = Arc::clone(&self.cache);
        let source = Arc::clone(&self.source);
        let config = config.clone();
        let total = files.len();

        rayon::spawn(move || {
            let progress = std::sync::atomic::AtomicUsize::new(done);
            rayon::scope(|scope| {
                for chunk in misses.chunks(chunk_size) {
                    if config.is_shutdown_requested() {
                        log::info!("metadata load interrupted; skipping remaining chunks");
                        break;
                    }
                    let chunk = chunk.to_vec();
                    let tx = tx.clone();
                    let cache = Arc::clone(&cache);
                    let source = Arc::clone(&source);
                    let config = &config;
                    let progress = &progress;

                    scope.spawn(move |_| {
                        let paths: Vec<PathBuf> =
                            chunk.iter().map(|f| f.path.clone()).collect();
                        let results = source.extract_batch(&paths, mode);

                        for (file, (path, result)) in chunk.iter().zip(results) {
                            debug_assert!(crate::path_utils::paths_equal(&file.path, &path));
                            let loaded = match result {
                                Ok(record) => {
                                    cache.put(&file.path, file.fingerprint(), record.clone());
                                    LoadedMetadata {
                                        file: file.with_status(FileStatus::Loaded),
                                        record,
                                        error: None,
                                    }
                                }
                                Err(error) => {
                                    log::warn!(
                                        "extraction failed for {}: {error}",
                                        file.path.display()
                                    );
                                    LoadedMetadata {
                                        file: file.with_error(error.to_string()),
                                        record: MetadataRecord::empty(mode),
                                        error: Some(error),
                                    }
                                }
                            };
                            let n = progress.fetch_add(1, Ordering::Relaxed) + 1;
                            if let Some(cb) = &config.progress_callback {
                                cb.on_progress(n.min(total), &loaded.file.name);
                            }
                            if tx.send(loaded).is_err() {
                                // Receiver dropped; the caller stopped consuming
                                return;
                            }
                        }
                    });
                }
            });
            if let Some(cb) = &config.progress_callback {
                cb.on_phase_end("metadata");
            }
            // tx drops here, ending the iterator
        });

        BatchLoad { rx }
    }

    /// Convenience wrapper: run a batch load to completion and return the
    /// results re-ordered to match the input order, plus stats.
    ///
    /// Metadata is re-associated with files by path identity, never by
    /// completion order.
    pub fn load_batch_collected(
        &self,
        files: &[FileEntry],
        mode: ExtractionMode,
        config: &LoaderConfig,
    ) -> (Vec<LoadedMetadata>, LoadStats) {
        let mut stats = LoadStats {
            requested: files.len(),
            ..LoadStats::default()
        };
        let before = self.cache.stats();

        let mut by_path: std::collections::HashMap<String, LoadedMetadata> = self
            .load_batch(files, mode, config)
            .map(|loaded| (crate::path_utils::path_key(&loaded.file.path), loaded))
            .collect();

        let after = self.cache.stats();
        stats.cache_hits = ((after.memory_hits + after.persistent_hits)
            - (before.memory_hits + before.persistent_hits)) as usize;

        let mut ordered = Vec::with_capacity(files.len());
        for file in files {
            match by_path.remove(&crate::path_utils::path_key(&file.path)) {
                Some(loaded) => {
                    if loaded.error.is_some() {
                        stats.failed += 1;
                    }
                    ordered.push(loaded);
                }
                // Not yielded: the load was cancelled before this file
                None => stats.interrupted = true,
            }
        }
        stats.extracted = stats.requested.saturating_sub(stats.cache_hits);
        if stats.interrupted {
            stats.extracted = stats
                .extracted
                .saturating_sub(stats.requested - ordered.len());
        }
        (ordered, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MetadataCache;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::UNIX_EPOCH;

    /// Mock source: configurable per-path results, call counting.
    struct MockSource {
        fail: Vec<PathBuf>,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                fail: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(fail: Vec<PathBuf>) -> Self {
            Self {
                fail,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl MetadataSource for MockSource {
        fn extract_one(
            &self,
            path: &Path,
            mode: ExtractionMode,
        ) -> Result<MetadataRecord, ExtractError> {
            self.calls.lock().unwrap().push(path.to_path_buf());
            if self.fail.iter().any(|f| f == path) {
                return Err(ExtractError::ProcessFailed("simulated".to_string()));
            }
            let mut fields = BTreeMap::new();
            fields.insert(
                "FileName".to_string(),
                path.file_name().unwrap().to_string_lossy().into_owned(),
            );
            Ok(MetadataRecord::new(fields, mode))
        }
    }

    fn entries(names: &[&str]) -> Vec<FileEntry> {
        names
            .iter()
            .map(|n| FileEntry::new(PathBuf::from(format!("/batch/{n}")), 1, UNIX_EPOCH))
            .collect()
    }

    fn loader_with(source: MockSource) -> (MetadataLoader, Arc<MetadataCache>) {
        let cache = Arc::new(MetadataCache::memory_only(64));
        let loader = MetadataLoader::new(Arc::clone(&cache), Arc::new(source));
        (loader, cache)
    }

    #[test]
    fn test_yields_one_result_per_file() {
        let (loader, _) = loader_with(MockSource::new());
        let files = entries(&["a.jpg", "b.jpg", "c.jpg"]);

        let results: Vec<_> = loader
            .load_batch(&files, ExtractionMode::Fast, &LoaderConfig::default())
            .collect();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_partial_failure_yields_all_files() {
        let files = entries(&["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]);
        let (loader, _) = loader_with(MockSource::failing_on(vec![files[2].path.clone()]));

        let (results, stats) = loader.load_batch_collected(
            &files,
            ExtractionMode::Fast,
            &LoaderConfig::default(),
        );

        assert_eq!(results.len(), 5);
        assert_eq!(stats.failed, 1);
        assert!(!stats.interrupted);

        let failed = &results[2];
        assert_eq!(failed.file.status, FileStatus::Error);
        assert!(failed.record.is_empty());
        assert!(failed.error.is_some());

        let ok: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
        assert_eq!(ok.len(), 4);
        assert!(ok.iter().all(|r| !r.record.is_empty()));
    }

    #[test]
    fn test_collected_results_preserve_input_order() {
        let files = entries(&["z.jpg", "a.jpg", "m.jpg"]);
        let (loader, _) = loader_with(MockSource::new());

        let (results, _) = loader.load_batch_collected(
            &files,
            ExtractionMode::Fast,
            &LoaderConfig::default().with_chunk_size(1),
        );

        let names: Vec<_> = results.iter().map(|r| r.file.name.as_str()).collect();
        assert_eq!(names, vec!["z.jpg", "a.jpg", "m.jpg"]);
    }

    #[test]
    fn test_second_load_is_served_from_cache() {
        let files = entries(&["a.jpg", "b.jpg"]);
        let (loader, cache) = loader_with(MockSource::new());

        let (_, first) = loader.load_batch_collected(
            &files,
            ExtractionMode::Fast,
            &LoaderConfig::default(),
        );
        assert_eq!(first.cache_hits, 0);

        let (results, second) = loader.load_batch_collected(
            &files,
            ExtractionMode::Fast,
            &LoaderConfig::default(),
        );
        assert_eq!(second.cache_hits, 2);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(cache.stats().memory_hits, 2);
    }

    #[test]
    fn test_failed_extraction_is_not_cached() {
        let files = entries(&["bad.jpg"]);
        let source = Arc::new(MockSource::failing_on(vec![files[0].path.clone()]));
        let cache = Arc::new(MetadataCache::memory_only(64));
        let source_dyn: Arc<dyn MetadataSource> = source.clone();
        let loader = MetadataLoader::new(Arc::clone(&cache), source_dyn);

        for _ in 0..2 {
            let (results, stats) = loader.load_batch_collected(
                &files,
                ExtractionMode::Fast,
                &LoaderConfig::default(),
            );
            assert_eq!(results.len(), 1);
            assert_eq!(stats.failed, 1);
        }
        // Both loads had to hit the source: failures are never cached
        assert_eq!(source.call_count(), 2);
    }

    #[test]
    fn test_cancelled_load_stops_between_chunks() {
        let files = entries(&["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
        let (loader, _) = loader_with(MockSource::new());

        let flag = Arc::new(AtomicBool::new(true)); // already cancelled
        let config = LoaderConfig::default()
            .with_chunk_size(1)
            .with_shutdown_flag(flag);

        let results: Vec<_> = loader
            .load_batch(&files, ExtractionMode::Fast, &config)
            .collect();
        // Nothing was cached, so a pre-cancelled load yields nothing
        assert!(results.is_empty());
    }
}
