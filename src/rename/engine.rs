//! Unified rename engine: compose, validate, preview, execute.
//!
//! # Overview
//!
//! Preview and execution are deliberately separate steps. Preview runs the
//! module chain and validation without touching the filesystem and is safe
//! to call on every keystroke (memoized, see
//! [`super::preview_cache`]). Execution happens only on an explicit call,
//! re-verifies each source file, and performs the actual renames with
//! per-file error capture; a filesystem failure on one file never aborts
//! the batch unless the caller asked for abort-on-error.
//!
//! # Ordering
//!
//! Module application order is the configured order; file order is the
//! batch order. Metadata may arrive in any order from the loader, so the
//! engine re-associates records with files by path, never by arrival
//! order. Preview output always has exactly one entry per input file, in
//! input order.
//!
//! # Case-only renames
//!
//! On case-insensitive filesystems a direct rename from `IMG_1.JPG` to
//! `img_1.jpg` can be a no-op. The engine routes such pairs through an
//! intermediate temporary name (two renames), rolling back to the original
//! name if the second step fails.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::files::FileEntry;
use crate::metadata::{ExtractionMode, LoaderConfig, MetadataLoader, MetadataRecord};
use crate::path_utils::path_key;
use crate::progress::ProgressCallback;

use super::modules::RenameModule;
use super::preview_cache::{
    hash_key, TtlCache, DEFAULT_FRAGMENT_TTL, DEFAULT_PREVIEW_TTL,
};
use super::transform::PostTransform;
use super::validate::{duplicate_target_indices, name_key, validate_filename};

/// A complete rename configuration: the ordered module chain plus the
/// final transform. Passed by value into every preview/execute call; the
/// engine never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenamePlan {
    /// Modules in application order.
    pub modules: Vec<RenameModule>,
    /// Transform applied to the concatenated stem.
    pub transform: PostTransform,
}

impl RenamePlan {
    /// Whether any module in the chain is effective.
    #[must_use]
    pub fn has_effective_modules(&self) -> bool {
        self.modules.iter().any(RenameModule::is_effective)
    }

    /// Whether any effective module consults metadata.
    #[must_use]
    pub fn needs_metadata(&self) -> bool {
        self.modules
            .iter()
            .any(|m| m.is_effective() && m.needs_metadata())
    }
}

/// Conflict classification for one preview entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// No conflict.
    None,
    /// Two or more batch entries produce this target name.
    DuplicateInBatch,
    /// The target name exists on disk outside the rename set.
    TargetExists,
}

/// One row of a preview: what would happen to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewEntry {
    /// Position in the input batch.
    pub index: usize,
    /// Current basename.
    pub old_name: String,
    /// Candidate new basename.
    pub new_name: String,
    /// Whether the candidate passed validation.
    pub valid: bool,
    /// Validation failure message, if any.
    pub error: Option<String>,
    /// Conflict classification.
    pub conflict: ConflictKind,
}

impl PreviewEntry {
    /// Whether this entry would change nothing.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.old_name == self.new_name
    }

    /// Whether this entry can be executed as-is.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.valid && self.conflict != ConflictKind::TargetExists && !self.is_unchanged()
    }
}

/// A conflict discovered at execution time: the target exists and is not
/// part of the rename set.
#[derive(Debug, Clone)]
pub struct Conflict {
    /// File being renamed.
    pub source: PathBuf,
    /// Occupied target path.
    pub target: PathBuf,
}

/// Caller decision for an execution-time conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Skip this file, continue with the rest.
    Skip,
    /// Skip this and every later conflicting file without asking again.
    SkipAll,
    /// Replace the existing target file.
    Overwrite,
    /// Stop the whole batch.
    Abort,
}

/// Supplies decisions for execution-time conflicts.
///
/// The engine never guesses: when a target exists, it asks the resolver
/// synchronously and acts on the answer before moving on.
pub trait ConflictResolver {
    /// Decide what to do about one conflict.
    fn resolve(&self, conflict: &Conflict) -> ConflictChoice;
}

/// Resolver that always answers with a fixed policy (CLI flags,
/// non-interactive runs, tests).
#[derive(Debug, Clone, Copy)]
pub struct PolicyResolver(pub ConflictChoice);

impl ConflictResolver for PolicyResolver {
    fn resolve(&self, _conflict: &Conflict) -> ConflictChoice {
        self.0
    }
}

/// Why a file was not renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Old and new names are identical.
    Unchanged,
    /// The candidate name failed validation.
    Invalid(String),
    /// Duplicate target within the batch.
    DuplicateTarget,
    /// The resolver said skip (or skip-all was in effect).
    Conflict,
    /// The batch was cancelled before this file.
    Cancelled,
    /// The batch was aborted before this file.
    Aborted,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged => write!(f, "name unchanged"),
            Self::Invalid(msg) => write!(f, "invalid name: {msg}"),
            Self::DuplicateTarget => write!(f, "duplicate target name in batch"),
            Self::Conflict => write!(f, "target exists"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Record of one successful rename, for the post-operation report and
/// future undo support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRecord {
    /// Path before the rename.
    pub old_path: PathBuf,
    /// Path after the rename.
    pub new_path: PathBuf,
    /// When the rename happened.
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one execution call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// Successful renames, in execution order.
    pub renamed: Vec<RenameRecord>,
    /// Files skipped, with reasons.
    pub skipped: Vec<(PathBuf, SkipReason)>,
    /// Files that hit a filesystem error, with messages.
    pub failed: Vec<(PathBuf, String)>,
    /// Whether the batch was cancelled midway.
    pub interrupted: bool,
    /// Whether the batch was aborted (resolver or abort-on-error).
    pub aborted: bool,
}

impl ExecutionReport {
    /// Number of files renamed.
    #[must_use]
    pub fn renamed_count(&self) -> usize {
        self.renamed.len()
    }

    /// Whether every file was renamed.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty() && !self.interrupted && !self.aborted
    }

    /// Human-readable one-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("renamed {} file(s)", self.renamed.len())];
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", self.failed.len()));
        }
        if self.interrupted {
            parts.push("interrupted".to_string());
        }
        if self.aborted {
            parts.push("aborted".to_string());
        }
        parts.join(", ")
    }
}

/// Options for one execution call.
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    /// Stop the whole batch on the first invalid file.
    pub abort_on_error: bool,
    /// Cooperative cancellation flag, checked between files.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback (`rename` phase).
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl ExecuteOptions {
    /// Enable abort-on-error.
    #[must_use]
    pub fn with_abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }

    /// Set the cancellation flag.
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

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Treat the filesystem as case-insensitive (duplicate detection and
    /// case-only rename handling). Defaults to the platform convention.
    pub case_insensitive_fs: bool,
    /// TTL for memoized previews.
    pub preview_ttl: Duration,
    /// TTL for memoized module fragments.
    pub fragment_ttl: Duration,
    /// Master switch for both memo layers; off in tests.
    pub memoization: bool,
    /// Extraction mode requested from the loader.
    pub extraction_mode: ExtractionMode,
    /// Options for metadata batch loads (chunking, cancellation,
    /// progress).
    pub loader: LoaderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            case_insensitive_fs: cfg!(any(windows, target_os = "macos")),
            preview_ttl: DEFAULT_PREVIEW_TTL,
            fragment_ttl: DEFAULT_FRAGMENT_TTL,
            memoization: true,
            extraction_mode: ExtractionMode::Fast,
            loader: LoaderConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Override filesystem case sensitivity.
    #[must_use]
    pub fn with_case_insensitive_fs(mut self, insensitive: bool) -> Self {
        self.case_insensitive_fs = insensitive;
        self
    }

    /// Disable the preview/fragment memo layers.
    #[must_use]
    pub fn without_memoization(mut self) -> Self {
        self.memoization = false;
        self
    }

    /// Set the extraction mode.
    #[must_use]
    pub fn with_extraction_mode(mut self, mode: ExtractionMode) -> Self {
        self.extraction_mode = mode;
        self
    }

    /// Set the metadata loader options.
    #[must_use]
    pub fn with_loader_config(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }
}

/// The unified rename engine.
///
/// Collaborators are injected: the metadata loader is optional (an engine
/// without one simply gives metadata modules nothing to read, and their
/// fallbacks apply). The engine holds no references to caller-owned
/// collections; batches are borrowed per call.
pub struct RenameEngine {
    config: EngineConfig,
    loader: Option<Arc<MetadataLoader>>,
    preview_cache: Mutex<TtlCache<Vec<PreviewEntry>>>,
    fragment_cache: Mutex<TtlCache<String>>,
}

impl RenameEngine {
    /// Create an engine with the given configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let preview_cache = if config.memoization {
            TtlCache::new(config.preview_ttl)
        } else {
            TtlCache::disabled()
        };
        let fragment_cache = if config.memoization {
            TtlCache::new(config.fragment_ttl)
        } else {
            TtlCache::disabled()
        };
        Self {
            config,
            loader: None,
            preview_cache: Mutex::new(preview_cache),
            fragment_cache: Mutex::new(fragment_cache),
        }
    }

    /// Attach a metadata loader for metadata-dependent modules.
    #[must_use]
    pub fn with_loader(mut self, loader: Arc<MetadataLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Compute the preview for a batch under a plan.
    ///
    /// Never touches the filesystem beyond existence checks for conflict
    /// flagging. Results are memoized for [`EngineConfig::preview_ttl`].
    pub fn preview(&self, files: &[FileEntry], plan: &RenamePlan) -> Vec<PreviewEntry> {
        let key = self.preview_key(files, plan);
        if let Some(cached) = self.preview_cache.lock().unwrap().get(key) {
            log::trace!("preview cache hit for {} files", files.len());
            return cached;
        }

        let metadata = self.load_metadata(files, plan);
        let entries = self.compose_and_validate(files, plan, &metadata);

        self.preview_cache.lock().unwrap().insert(key, entries.clone());
        entries
    }

    /// Execute the plan against the filesystem.
    ///
    /// Only executes entries the preview marks executable; everything else
    /// is reported as skipped with its reason. Conflicts found at
    /// execution time (races with external changes) go through `resolver`.
    pub fn execute(
        &self,
        files: &[FileEntry],
        plan: &RenamePlan,
        resolver: &dyn ConflictResolver,
        options: &ExecuteOptions,
    ) -> ExecutionReport {
        let previews = self.preview(files, plan);
        let mut report = ExecutionReport::default();
        let mut skip_all = false;

        if let Some(cb) = &options.progress_callback {
            cb.on_phase_start("rename", files.len());
        }

        for (file, preview) in files.iter().zip(&previews) {
            // Cancellation is only checked between files; a file is never
            // left half-renamed
            if options.is_shutdown_requested() {
                report.interrupted = true;
                report
                    .skipped
                    .push((file.path.clone(), SkipReason::Cancelled));
                continue;
            }
            if report.aborted {
                report
                    .skipped
                    .push((file.path.clone(), SkipReason::Aborted));
                continue;
            }
            if let Some(cb) = &options.progress_callback {
                cb.on_progress(preview.index + 1, &file.name);
            }

            if preview.is_unchanged() {
                report
                    .skipped
                    .push((file.path.clone(), SkipReason::Unchanged));
                continue;
            }
            if !preview.valid {
                let msg = preview
                    .error
                    .clone()
                    .unwrap_or_else(|| "invalid name".to_string());
                if options.abort_on_error {
                    log::warn!("aborting batch: {}: {msg}", file.name);
                    report.aborted = true;
                }
                report
                    .skipped
                    .push((file.path.clone(), SkipReason::Invalid(msg)));
                continue;
            }
            if preview.conflict == ConflictKind::DuplicateInBatch {
                // Duplicates are never executed without the user reworking
                // the plan first
                report
                    .skipped
                    .push((file.path.clone(), SkipReason::DuplicateTarget));
                continue;
            }

            let parent = file.path.parent().unwrap_or_else(|| Path::new("."));
            let target = parent.join(&preview.new_name);
            let case_only = self.is_case_only(&preview.old_name, &preview.new_name);

            // Re-check the source: it may have vanished since preview
            if fs::symlink_metadata(&file.path).is_err() {
                report.failed.push((
                    file.path.clone(),
                    "source file no longer exists".to_string(),
                ));
                continue;
            }

            // Execution-time collision check (race with external changes).
            // A case-only rename sees its own source at the target path on
            // a case-insensitive filesystem; that is not a conflict.
            let mut overwrite = false;
            if !case_only && fs::symlink_metadata(&target).is_ok() {
                if skip_all {
                    report
                        .skipped
                        .push((file.path.clone(), SkipReason::Conflict));
                    continue;
                }
                let conflict = Conflict {
                    source: file.path.clone(),
                    target: target.clone(),
                };
                match resolver.resolve(&conflict) {
                    ConflictChoice::Skip => {
                        report
                            .skipped
                            .push((file.path.clone(), SkipReason::Conflict));
                        continue;
                    }
                    ConflictChoice::SkipAll => {
                        skip_all = true;
                        report
                            .skipped
                            .push((file.path.clone(), SkipReason::Conflict));
                        continue;
                    }
                    ConflictChoice::Overwrite => overwrite = true,
                    ConflictChoice::Abort => {
                        log::warn!("batch aborted at {}", file.name);
                        report.aborted = true;
                        report
                            .skipped
                            .push((file.path.clone(), SkipReason::Aborted));
                        continue;
                    }
                }
            }

            let result = if case_only {
                rename_case_only(&file.path, &target)
            } else if overwrite {
                rename_overwriting(&file.path, &target)
            } else {
                fs::rename(&file.path, &target)
            };

            match result {
                Ok(()) => {
                    log::debug!("renamed {} -> {}", file.name, preview.new_name);
                    report.renamed.push(RenameRecord {
                        old_path: file.path.clone(),
                        new_path: target,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    log::warn!("rename failed for {}: {e}", file.path.display());
                    report.failed.push((file.path.clone(), e.to_string()));
                }
            }
        }

        if let Some(cb) = &options.progress_callback {
            cb.on_phase_end("rename");
        }
        log::info!("{}", report.summary());
        report
    }

    fn preview_key(&self, files: &[FileEntry], plan: &RenamePlan) -> u64 {
        let identities: Vec<(String, i64)> = files
            .iter()
            .map(|f| (path_key(&f.path), f.fingerprint().mtime_ns))
            .collect();
        hash_key(&(identities, plan, self.config.case_insensitive_fs))
    }

    fn load_metadata(
        &self,
        files: &[FileEntry],
        plan: &RenamePlan,
    ) -> HashMap<String, MetadataRecord> {
        if !plan.needs_metadata() {
            return HashMap::new();
        }
        let Some(loader) = &self.loader else {
            log::warn!("plan needs metadata but no loader is attached; using fallbacks");
            return HashMap::new();
        };
        let (results, stats) = loader.load_batch_collected(
            files,
            self.config.extraction_mode,
            &self.config.loader,
        );
        if stats.failed > 0 {
            log::warn!(
                "metadata extraction failed for {} of {} file(s)",
                stats.failed,
                stats.requested
            );
        }
        results
            .into_iter()
            .filter(|r| r.error.is_none())
            .map(|r| (path_key(&r.file.path), r.record))
            .collect()
    }

    fn compose_and_validate(
        &self,
        files: &[FileEntry],
        plan: &RenamePlan,
        metadata: &HashMap<String, MetadataRecord>,
    ) -> Vec<PreviewEntry> {
        // Compose, in file order
        let new_names: Vec<String> = files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let record = metadata.get(&path_key(&file.path));
                self.compose_name(file, index, plan, record)
            })
            .collect();

        // Duplicate targets within the batch
        let duplicates: HashSet<usize> = duplicate_target_indices(
            &new_names,
            self.config.case_insensitive_fs,
        )
        .into_iter()
        .collect();

        // Source names per directory; a target occupied by a batch member
        // is not an on-disk conflict, the member is being renamed away
        let mut sources_by_dir: HashMap<PathBuf, HashSet<String>> = HashMap::new();
        for file in files {
            let parent = file
                .path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            sources_by_dir
                .entry(parent)
                .or_default()
                .insert(name_key(&file.name, self.config.case_insensitive_fs));
        }

        files
            .iter()
            .zip(new_names)
            .enumerate()
            .map(|(index, (file, new_name))| {
                let (valid, error) = match validate_filename(&new_name) {
                    Ok(()) => (true, None),
                    Err(e) => (false, Some(e.to_string())),
                };

                let mut conflict = ConflictKind::None;
                if valid {
                    if duplicates.contains(&index) {
                        conflict = ConflictKind::DuplicateInBatch;
                    } else if new_name != file.name {
                        let parent = file.path.parent().unwrap_or_else(|| Path::new("."));
                        let target = parent.join(&new_name);
                        let target_is_batch_source = sources_by_dir
                            .get(parent)
                            .is_some_and(|names| {
                                names.contains(&name_key(
                                    &new_name,
                                    self.config.case_insensitive_fs,
                                ))
                            });
                        if !target_is_batch_source && fs::symlink_metadata(&target).is_ok() {
                            conflict = ConflictKind::TargetExists;
                        }
                    }
                }

                PreviewEntry {
                    index,
                    old_name: file.name.clone(),
                    new_name,
                    valid,
                    error,
                    conflict,
                }
            })
            .collect()
    }

    /// Compose the candidate name for one file: effective modules in
    /// order, then the final transform, then the original extension.
    fn compose_name(
        &self,
        file: &FileEntry,
        index: usize,
        plan: &RenamePlan,
        metadata: Option<&MetadataRecord>,
    ) -> String {
        let mut stem = String::new();
        let mut any_effective = false;
        for module in &plan.modules {
            if !module.is_effective() {
                continue;
            }
            any_effective = true;
            stem.push_str(&self.fragment(module, file, index, metadata));
        }
        // No effective modules: the name passes through untouched except
        // for the final transform
        if !any_effective {
            stem = file.stem().to_string();
        }
        let stem = plan.transform.apply(&stem);
        format!("{stem}{ext}", ext = file.extension())
    }

    fn fragment(
        &self,
        module: &RenameModule,
        file: &FileEntry,
        index: usize,
        metadata: Option<&MetadataRecord>,
    ) -> String {
        // Metadata-dependent fragments are not memoized; their key would
        // have to include the record itself
        if module.needs_metadata() {
            return module.apply(file, index, metadata);
        }
        let key = hash_key(&(module, path_key(&file.path), index));
        if let Some(hit) = self.fragment_cache.lock().unwrap().get(key) {
            return hit;
        }
        let fragment = module.apply(file, index, metadata);
        self.fragment_cache
            .lock()
            .unwrap()
            .insert(key, fragment.clone());
        fragment
    }

    fn is_case_only(&self, old_name: &str, new_name: &str) -> bool {
        self.config.case_insensitive_fs
            && old_name != new_name
            && old_name.to_lowercase() == new_name.to_lowercase()
    }
}

/// Two-step rename for case-only changes.
///
/// A direct rename may be a no-op on case-insensitive filesystems, so the
/// file moves through a unique temporary name first. If the second step
/// fails, the first is rolled back so the file keeps its original name.
fn rename_case_only(old: &Path, new: &Path) -> io::Result<()> {
    let parent = old.parent().unwrap_or_else(|| Path::new("."));
    let tmp = unique_temp_path(parent);

    fs::rename(old, &tmp)?;
    match fs::rename(&tmp, new) {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Err(rollback) = fs::rename(&tmp, old) {
                log::error!(
                    "case-only rename rollback failed for {}: {rollback}",
                    old.display()
                );
            }
            Err(e)
        }
    }
}

/// Rename with explicit replacement of an existing target.
///
/// `fs::rename` replaces on Unix but fails on Windows when the target
/// exists, so the target is removed first on all platforms for uniform
/// behavior.
fn rename_overwriting(old: &Path, new: &Path) -> io::Result<()> {
    match fs::remove_file(new) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::rename(old, new)
}

fn unique_temp_path(parent: &Path) -> PathBuf {
    let pid = std::process::id();
    let mut n = 0u32;
    loop {
        let candidate = parent.join(format!(".oncutf-tmp-{pid}-{n}"));
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        n += 1;
    }
}
