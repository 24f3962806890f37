//! Batch loader behavior: streaming, partial failure, cache interplay,
//! and metadata-driven renames end to end.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use oncutf::cache::MetadataCache;
use oncutf::files::{FileEntry, FileStatus};
use oncutf::metadata::{
    ExtractError, ExtractionMode, LoaderConfig, MetadataLoader, MetadataRecord, MetadataSource,
};
use oncutf::rename::{
    ConflictChoice, EngineConfig, ExecuteOptions, PolicyResolver, PostTransform, RenameEngine,
    RenameModule, RenamePlan,
};
use tempfile::tempdir;

/// Deterministic in-memory source: serves a Model per file, fails where
/// told to, counts extractions.
struct FakeSource {
    models: BTreeMap<PathBuf, String>,
    fail: Vec<PathBuf>,
    extractions: AtomicUsize,
}

impl FakeSource {
    fn new(models: BTreeMap<PathBuf, String>) -> Self {
        Self {
            models,
            fail: Vec::new(),
            extractions: AtomicUsize::new(0),
        }
    }

    fn with_failures(mut self, fail: Vec<PathBuf>) -> Self {
        self.fail = fail;
        self
    }
}

impl MetadataSource for FakeSource {
    fn extract_one(
        &self,
        path: &Path,
        mode: ExtractionMode,
    ) -> Result<MetadataRecord, ExtractError> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        if self.fail.iter().any(|f| f == path) {
            return Err(ExtractError::Timeout {
                path: path.to_path_buf(),
                seconds: 10,
            });
        }
        let mut fields = BTreeMap::new();
        if let Some(model) = self.models.get(path) {
            fields.insert("Model".to_string(), model.clone());
        }
        Ok(MetadataRecord::new(fields, mode))
    }
}

fn make_files(dir: &Path, names: &[&str]) -> Vec<FileEntry> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, b"data").unwrap();
            FileEntry::from_path(&path).unwrap()
        })
        .collect()
}

#[test]
fn test_five_files_one_failure_yields_five_results() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path(), &["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]);

    let models: BTreeMap<_, _> = files
        .iter()
        .map(|f| (f.path.clone(), "CAM".to_string()))
        .collect();
    let source = FakeSource::new(models).with_failures(vec![files[1].path.clone()]);

    let cache = Arc::new(MetadataCache::memory_only(64));
    let loader = MetadataLoader::new(cache, Arc::new(source));

    let (results, stats) =
        loader.load_batch_collected(&files, ExtractionMode::Fast, &LoaderConfig::default());

    assert_eq!(results.len(), 5);
    assert_eq!(stats.failed, 1);

    let populated = results.iter().filter(|r| !r.record.is_empty()).count();
    assert_eq!(populated, 4);

    let failed = &results[1];
    assert_eq!(failed.file.status, FileStatus::Error);
    assert!(failed.record.is_empty());
    assert!(matches!(failed.error, Some(ExtractError::Timeout { .. })));
}

#[test]
fn test_streaming_iterator_yields_while_loading() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path(), &["a.jpg", "b.jpg", "c.jpg"]);

    let models: BTreeMap<_, _> = files
        .iter()
        .map(|f| (f.path.clone(), "CAM".to_string()))
        .collect();
    let cache = Arc::new(MetadataCache::memory_only(64));
    let loader = MetadataLoader::new(cache, Arc::new(FakeSource::new(models)));

    // Consume one result at a time; the iterator must hand results out
    // without requiring the whole batch first
    let mut seen = 0;
    for loaded in loader.load_batch(
        &files,
        ExtractionMode::Fast,
        &LoaderConfig::default().with_chunk_size(1),
    ) {
        assert!(loaded.is_ok());
        seen += 1;
    }
    assert_eq!(seen, 3);
}

#[test]
fn test_cached_files_skip_extraction() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path(), &["a.jpg", "b.jpg"]);

    let models: BTreeMap<_, _> = files
        .iter()
        .map(|f| (f.path.clone(), "CAM".to_string()))
        .collect();
    let source = Arc::new(FakeSource::new(models));
    let cache = Arc::new(MetadataCache::memory_only(64));
    let source_dyn: Arc<dyn MetadataSource> = source.clone();
    let loader = MetadataLoader::new(Arc::clone(&cache), source_dyn);

    loader.load_batch_collected(&files, ExtractionMode::Fast, &LoaderConfig::default());
    let first_round = source.extractions.load(Ordering::SeqCst);
    assert_eq!(first_round, 2);

    let (_, stats) =
        loader.load_batch_collected(&files, ExtractionMode::Fast, &LoaderConfig::default());
    assert_eq!(stats.cache_hits, 2);
    assert_eq!(source.extractions.load(Ordering::SeqCst), first_round);
}

#[test]
fn test_metadata_driven_rename_end_to_end() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path(), &["a.jpg", "b.jpg"]);

    let mut models = BTreeMap::new();
    models.insert(files[0].path.clone(), "Alpha7".to_string());
    models.insert(files[1].path.clone(), "X100V".to_string());

    let cache = Arc::new(MetadataCache::memory_only(64));
    let loader = Arc::new(MetadataLoader::new(
        cache,
        Arc::new(FakeSource::new(models)),
    ));

    let engine = RenameEngine::new(
        EngineConfig::default()
            .with_case_insensitive_fs(false)
            .without_memoization(),
    )
    .with_loader(loader);

    let plan = RenamePlan {
        modules: vec![
            RenameModule::MetadataField {
                field: "Model".to_string(),
                fallback: "unknown".to_string(),
            },
            RenameModule::SpecifiedText {
                text: "_".to_string(),
            },
            RenameModule::Counter {
                start: 1,
                step: 1,
                padding: 2,
            },
        ],
        transform: PostTransform::default(),
    };

    let previews = engine.preview(&files, &plan);
    assert_eq!(previews[0].new_name, "Alpha7_01.jpg");
    assert_eq!(previews[1].new_name, "X100V_02.jpg");

    let report = engine.execute(
        &files,
        &plan,
        &PolicyResolver(ConflictChoice::Skip),
        &ExecuteOptions::default(),
    );
    assert_eq!(report.renamed_count(), 2);

    let mut names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Alpha7_01.jpg", "X100V_02.jpg"]);
}

#[test]
fn test_extraction_failure_falls_back_in_rename() {
    let dir = tempdir().unwrap();
    let files = make_files(dir.path(), &["a.jpg"]);

    let source =
        FakeSource::new(BTreeMap::new()).with_failures(vec![files[0].path.clone()]);
    let cache = Arc::new(MetadataCache::memory_only(64));
    let loader = Arc::new(MetadataLoader::new(cache, Arc::new(source)));

    let engine = RenameEngine::new(
        EngineConfig::default()
            .with_case_insensitive_fs(false)
            .without_memoization(),
    )
    .with_loader(loader);

    let plan = RenamePlan {
        modules: vec![RenameModule::MetadataField {
            field: "Model".to_string(),
            fallback: "nodata".to_string(),
        }],
        transform: PostTransform::default(),
    };

    // The failing file still gets a preview entry, built from fallbacks
    let previews = engine.preview(&files, &plan);
    assert_eq!(previews.len(), 1);
    assert_eq!(previews[0].new_name, "nodata.jpg");
}
