//! Application wiring: batch collection, engine assembly, and the
//! subcommand drivers behind [`run_app`].

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::cache::MetadataCache;
use crate::cli::{ApplyArgs, BatchArgs, Cli, ClearCacheArgs, Commands, OutputFormat};
use crate::config::Config;
use crate::error::ExitCode;
use crate::files::FileEntry;
use crate::metadata::{
    force_cleanup_all, ExifTool, ExifToolConfig, ExtractionMode, LoaderConfig, MetadataLoader,
};
use crate::progress::Progress;
use crate::rename::{
    ConflictKind, EngineConfig, ExecuteOptions, PolicyResolver, PreviewEntry, RenameEngine,
    SkipReason,
};
use crate::signal::{install_handler, ShutdownHandler};

/// Run the application logic for parsed CLI arguments.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    crate::logging::init_logging(cli.verbose, cli.quiet);
    let config = Config::load();

    let code = match &cli.command {
        Commands::Preview(args) => run_preview(args, &config, cli.quiet)?,
        Commands::Apply(args) => run_apply(args, &config, cli.quiet)?,
        Commands::ClearCache(args) => run_clear_cache(args, &config)?,
    };

    // Safety net: no extractor process survives the application
    force_cleanup_all();
    Ok(code)
}

fn run_preview(args: &BatchArgs, config: &Config, quiet: bool) -> Result<ExitCode> {
    let files = collect_batch(&args.paths, args.recursive)?;
    if files.is_empty() {
        log::info!("no files to rename");
        return Ok(ExitCode::NothingToDo);
    }

    let engine = build_engine(args, config, None, quiet)?;
    let plan = args.to_plan();
    let previews = engine.preview(&files, &plan);
    print_previews(&previews, args.output);
    Ok(ExitCode::Success)
}

fn run_apply(args: &ApplyArgs, config: &Config, quiet: bool) -> Result<ExitCode> {
    let files = collect_batch(&args.batch.paths, args.batch.recursive)?;
    if files.is_empty() {
        log::info!("no files to rename");
        return Ok(ExitCode::NothingToDo);
    }

    let shutdown = install_handler()?;
    let engine = build_engine(&args.batch, config, Some(&shutdown), quiet)?;
    let plan = args.batch.to_plan();

    // Show the user what will happen before asking for confirmation
    let previews = engine.preview(&files, &plan);
    print_previews(&previews, args.batch.output);

    let executable = previews.iter().filter(|p| p.is_executable()).count();
    if executable == 0 {
        log::info!("nothing to rename under this plan");
        return Ok(ExitCode::NothingToDo);
    }
    if !args.yes && !confirm(&format!("Rename {executable} file(s)?"))? {
        println!("Aborted.");
        return Ok(ExitCode::NothingToDo);
    }

    let resolver = PolicyResolver(args.on_conflict.into());
    let mut options = ExecuteOptions::default()
        .with_abort_on_error(args.abort_on_error)
        .with_shutdown_flag(shutdown.get_flag());
    if !quiet {
        options = options.with_progress_callback(Arc::new(Progress::new(quiet)));
    }

    let report = engine.execute(&files, &plan, &resolver, &options);
    println!("{}", report.summary());
    for (path, reason) in &report.skipped {
        if *reason != SkipReason::Unchanged {
            println!("  skipped {}: {reason}", path.display());
        }
    }
    for (path, message) in &report.failed {
        println!("  failed {}: {message}", path.display());
    }

    Ok(exit_code_for_report(&report))
}

fn run_clear_cache(args: &ClearCacheArgs, _config: &Config) -> Result<ExitCode> {
    let path = match &args.cache {
        Some(path) => path.clone(),
        None => Config::default_cache_path()?,
    };
    if !path.exists() {
        println!("No cache at {}", path.display());
        return Ok(ExitCode::NothingToDo);
    }
    let cache = MetadataCache::open(&path, 1)
        .with_context(|| format!("failed to open cache at {}", path.display()))?;
    let removed = cache.clear()?;
    println!("Cleared {removed} cached entries from {}", path.display());
    Ok(ExitCode::Success)
}

/// Collect the ordered file batch from CLI path arguments.
///
/// Directories contribute their regular files (recursively with
/// `--recursive`); explicit file arguments are taken as-is. The batch is
/// de-duplicated and sorted by path so module indices are deterministic.
fn collect_batch(paths: &[PathBuf], recursive: bool) -> Result<Vec<FileEntry>> {
    let mut by_key: BTreeMap<String, FileEntry> = BTreeMap::new();

    for path in paths {
        let meta = std::fs::metadata(path)
            .with_context(|| format!("cannot access {}", path.display()))?;
        if meta.is_dir() {
            let max_depth = if recursive { usize::MAX } else { 1 };
            for entry in WalkDir::new(path).max_depth(max_depth) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("skipping unreadable entry: {e}");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                match FileEntry::from_path(entry.path()) {
                    Ok(file) => {
                        by_key.insert(crate::path_utils::path_key(entry.path()), file);
                    }
                    Err(e) => log::warn!("skipping {}: {e}", entry.path().display()),
                }
            }
        } else {
            let file = FileEntry::from_path(path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            by_key.insert(crate::path_utils::path_key(path), file);
        }
    }

    Ok(by_key.into_values().collect())
}

/// Assemble the rename engine: cache, extractor, loader, tunables.
fn build_engine(
    args: &BatchArgs,
    config: &Config,
    shutdown: Option<&ShutdownHandler>,
    quiet: bool,
) -> Result<RenameEngine> {
    let cache = if args.no_cache {
        MetadataCache::memory_only(config.memory_cache_entries)
    } else {
        let path = match &args.cache {
            Some(path) => path.clone(),
            None => Config::default_cache_path()?,
        };
        MetadataCache::open(&path, config.memory_cache_entries)
            .with_context(|| format!("failed to open cache at {}", path.display()))?
    };

    let exiftool_config = ExifToolConfig::default()
        .with_binary(
            args.exiftool
                .clone()
                .unwrap_or_else(|| config.exiftool_binary.clone()),
        )
        .with_timeout(config.extraction_timeout());
    let source = Arc::new(ExifTool::new(exiftool_config));

    let plan = args.to_plan();
    if plan.needs_metadata() && !source.is_available() {
        log::warn!(
            "extractor binary not found; metadata fields will use fallbacks"
        );
    }

    let loader = Arc::new(MetadataLoader::new(Arc::new(cache), source));

    let mut loader_config =
        LoaderConfig::default().with_chunk_size(config.extraction_chunk_size);
    if let Some(shutdown) = shutdown {
        loader_config = loader_config.with_shutdown_flag(shutdown.get_flag());
    }
    if !quiet && plan.needs_metadata() {
        loader_config = loader_config.with_progress_callback(Arc::new(Progress::new(quiet)));
    }

    let mode = if args.extended {
        ExtractionMode::Extended
    } else {
        ExtractionMode::Fast
    };
    let engine_config = EngineConfig {
        preview_ttl: std::time::Duration::from_millis(config.preview_ttl_ms),
        fragment_ttl: std::time::Duration::from_millis(config.fragment_ttl_ms),
        ..EngineConfig::default()
    }
    .with_extraction_mode(mode)
    .with_loader_config(loader_config);

    Ok(RenameEngine::new(engine_config).with_loader(loader))
}

fn print_previews(previews: &[PreviewEntry], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = previews
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "old_name": p.old_name,
                        "new_name": p.new_name,
                        "valid": p.valid,
                        "error": p.error,
                        "conflict": match p.conflict {
                            ConflictKind::None => "none",
                            ConflictKind::DuplicateInBatch => "duplicate",
                            ConflictKind::TargetExists => "exists",
                        },
                        "unchanged": p.is_unchanged(),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Text => {
            let width = previews
                .iter()
                .map(|p| p.old_name.chars().count())
                .max()
                .unwrap_or(0);
            for p in previews {
                let marker = if !p.valid {
                    "✗"
                } else {
                    match p.conflict {
                        ConflictKind::None if p.is_unchanged() => "=",
                        ConflictKind::None => "→",
                        ConflictKind::DuplicateInBatch => "!",
                        ConflictKind::TargetExists => "#",
                    }
                };
                let note = if let Some(error) = &p.error {
                    format!("  ({error})")
                } else {
                    match p.conflict {
                        ConflictKind::DuplicateInBatch => "  (duplicate target)".to_string(),
                        ConflictKind::TargetExists => "  (target exists)".to_string(),
                        ConflictKind::None => String::new(),
                    }
                };
                println!("{:width$}  {marker}  {}{note}", p.old_name, p.new_name);
            }
        }
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N]: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes" | "Yes"))
}

fn exit_code_for_report(report: &crate::rename::ExecutionReport) -> ExitCode {
    if report.interrupted {
        return ExitCode::Interrupted;
    }
    let real_skips = report
        .skipped
        .iter()
        .any(|(_, reason)| *reason != SkipReason::Unchanged);
    if report.aborted || !report.failed.is_empty() || real_skips {
        ExitCode::PartialSuccess
    } else if report.renamed.is_empty() {
        ExitCode::NothingToDo
    } else {
        ExitCode::Success
    }
}
