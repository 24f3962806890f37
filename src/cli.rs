//! Command-line interface definitions for oncutf.
//!
//! All CLI arguments, subcommands, and options via the clap derive API:
//! global options (verbosity, JSON errors) plus subcommands for preview,
//! apply, and cache maintenance.
//!
//! # Module order
//!
//! The rename chain is built in a fixed, documented order:
//! text removal (or `--keep-name`), then `--text`, then
//! `--metadata-field`, then `--counter`. The final `--case`/`--separator`
//! transform applies to the concatenated result.
//!
//! # Example
//!
//! ```bash
//! # Preview a counter rename over a directory
//! oncutf preview ~/Pictures/batch --counter --counter-padding 3
//!
//! # Rename by camera model and a counter, applying for real
//! oncutf apply ~/Pictures/batch --metadata-field Model --counter -y
//!
//! # Strip a prefix and lowercase everything
//! oncutf apply ./scans --remove-text "SCAN_" --remove-from start --case lower -y
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::rename::{
    CaseStyle, ConflictChoice, PostTransform, RemovalPosition, RenameModule, RenamePlan,
    SeparatorStyle,
};

/// Batch file renamer with EXIF/metadata support.
///
/// oncutf composes new filenames from configurable modules (counter,
/// fixed text, metadata fields, transforms of the original name),
/// previews the result, and executes renames with conflict handling.
#[derive(Debug, Parser)]
#[command(name = "oncutf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for oncutf.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show what a rename plan would do, without touching any file
    Preview(BatchArgs),
    /// Execute a rename plan against the filesystem
    Apply(ApplyArgs),
    /// Clear the persistent metadata cache
    ClearCache(ClearCacheArgs),
}

/// Output format for preview results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Text,
    /// Machine-readable JSON
    Json,
}

/// Case transform argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CaseArg {
    /// Leave casing unchanged
    #[default]
    Keep,
    /// all lowercase
    Lower,
    /// ALL UPPERCASE
    Upper,
    /// First letter uppercase
    Capitalize,
}

impl From<CaseArg> for CaseStyle {
    fn from(arg: CaseArg) -> Self {
        match arg {
            CaseArg::Keep => Self::Keep,
            CaseArg::Lower => Self::Lower,
            CaseArg::Upper => Self::Upper,
            CaseArg::Capitalize => Self::Capitalize,
        }
    }
}

/// Separator transform argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SeparatorArg {
    /// Leave separators unchanged
    #[default]
    Keep,
    /// Spaces become underscores
    Underscores,
    /// Underscores become spaces
    Spaces,
    /// Spaces and underscores become dashes
    Dashes,
}

impl From<SeparatorArg> for SeparatorStyle {
    fn from(arg: SeparatorArg) -> Self {
        match arg {
            SeparatorArg::Keep => Self::Keep,
            SeparatorArg::Underscores => Self::Underscores,
            SeparatorArg::Spaces => Self::Spaces,
            SeparatorArg::Dashes => Self::Dashes,
        }
    }
}

/// Where `--remove-text` matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RemoveFromArg {
    /// Only at the start of the name
    Start,
    /// Only at the end of the name
    End,
    /// Every occurrence
    #[default]
    Anywhere,
}

impl From<RemoveFromArg> for RemovalPosition {
    fn from(arg: RemoveFromArg) -> Self {
        match arg {
            RemoveFromArg::Start => Self::Start,
            RemoveFromArg::End => Self::End,
            RemoveFromArg::Anywhere => Self::Anywhere,
        }
    }
}

/// Fixed policy for execution-time conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OnConflictArg {
    /// Skip the conflicting file and continue
    #[default]
    Skip,
    /// Skip every conflicting file without further prompts
    SkipAll,
    /// Replace the existing target file
    Overwrite,
    /// Stop the whole batch
    Abort,
}

impl From<OnConflictArg> for ConflictChoice {
    fn from(arg: OnConflictArg) -> Self {
        match arg {
            OnConflictArg::Skip => Self::Skip,
            OnConflictArg::SkipAll => Self::SkipAll,
            OnConflictArg::Overwrite => Self::Overwrite,
            OnConflictArg::Abort => Self::Abort,
        }
    }
}

/// Batch selection and rename plan options shared by preview and apply.
#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Files or directories to rename (directories contribute their files)
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// Recurse into subdirectories of directory arguments
    #[arg(short, long)]
    pub recursive: bool,

    /// Add a counter module to the chain
    #[arg(long)]
    pub counter: bool,

    /// Counter value for the first file
    #[arg(long, value_name = "N", default_value = "1")]
    pub counter_start: u32,

    /// Counter increment between files
    #[arg(long, value_name = "N", default_value = "1")]
    pub counter_step: u32,

    /// Minimum counter digits, zero-padded
    #[arg(long, value_name = "N", default_value = "3")]
    pub counter_padding: usize,

    /// Add a fixed text fragment to the chain
    #[arg(long, value_name = "TEXT")]
    pub text: Option<String>,

    /// Add a metadata field module (e.g. Model, DateTimeOriginal)
    #[arg(long, value_name = "FIELD")]
    pub metadata_field: Option<String>,

    /// Fragment used when the metadata field is missing
    #[arg(long, value_name = "TEXT", default_value = "")]
    pub metadata_fallback: String,

    /// Keep the original name (stem) as a fragment
    #[arg(long)]
    pub keep_name: bool,

    /// Keep the original name with this text removed
    #[arg(long, value_name = "PATTERN", conflicts_with = "keep_name")]
    pub remove_text: Option<String>,

    /// Where --remove-text matches
    #[arg(long, value_enum, default_value = "anywhere")]
    pub remove_from: RemoveFromArg,

    /// Match --remove-text case-sensitively
    #[arg(long)]
    pub remove_case_sensitive: bool,

    /// Case transform applied to the composed name
    #[arg(long, value_enum, default_value = "keep")]
    pub case: CaseArg,

    /// Separator transform applied to the composed name
    #[arg(long, value_enum, default_value = "keep")]
    pub separator: SeparatorArg,

    /// Use extended (one-shot) metadata extraction
    ///
    /// Slower: bypasses the persistent extractor process, but reaches
    /// fields the fast path cannot.
    #[arg(long)]
    pub extended: bool,

    /// Path to the metadata cache database
    ///
    /// If not specified, a default platform-specific path is used.
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Disable the persistent metadata cache
    #[arg(long, conflicts_with = "cache")]
    pub no_cache: bool,

    /// Extractor binary to use
    #[arg(long, value_name = "BIN", env = "ONCUTF_EXIFTOOL")]
    pub exiftool: Option<PathBuf>,

    /// Output format for the preview listing
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

impl BatchArgs {
    /// Build the rename plan from the module flags, in the documented
    /// fixed order.
    #[must_use]
    pub fn to_plan(&self) -> RenamePlan {
        let mut modules = Vec::new();

        if let Some(pattern) = &self.remove_text {
            modules.push(RenameModule::TextRemoval {
                pattern: pattern.clone(),
                position: self.remove_from.into(),
                case_sensitive: self.remove_case_sensitive,
            });
        } else if self.keep_name {
            modules.push(RenameModule::OriginalName {
                case: CaseStyle::Keep,
            });
        }
        if let Some(text) = &self.text {
            modules.push(RenameModule::SpecifiedText { text: text.clone() });
        }
        if let Some(field) = &self.metadata_field {
            modules.push(RenameModule::MetadataField {
                field: field.clone(),
                fallback: self.metadata_fallback.clone(),
            });
        }
        if self.counter {
            modules.push(RenameModule::Counter {
                start: self.counter_start,
                step: self.counter_step,
                padding: self.counter_padding,
            });
        }

        RenamePlan {
            modules,
            transform: PostTransform {
                case: self.case.into(),
                separator: self.separator.into(),
            },
        }
    }
}

/// Arguments for the apply subcommand.
#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Batch and plan options (same as preview)
    #[command(flatten)]
    pub batch: BatchArgs,

    /// Policy for targets that already exist on disk
    #[arg(long, value_enum, default_value = "skip")]
    pub on_conflict: OnConflictArg,

    /// Stop the whole batch on the first invalid name
    #[arg(long)]
    pub abort_on_error: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the clear-cache subcommand.
#[derive(Debug, Args)]
pub struct ClearCacheArgs {
    /// Path to the metadata cache database
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,
}
