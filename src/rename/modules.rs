//! Rename module chain.
//!
//! Each module contributes one fragment of the final filename. Modules are
//! pure: `apply` sees the file entry, its position in the batch, and an
//! optional metadata record, and returns a text fragment. It never builds
//! the full filename and never touches the filesystem, which keeps the
//! chain cheap enough to re-run on every keystroke and deterministic
//! enough to unit test without I/O.
//!
//! A module whose configuration cannot contribute anything (empty text,
//! empty pattern) reports itself as not effective, and the engine skips it
//! entirely.

use std::sync::OnceLock;

use regex::Regex;

use crate::files::FileEntry;
use crate::metadata::MetadataRecord;

use super::transform::CaseStyle;

/// Where a text-removal pattern is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RemovalPosition {
    /// Only at the start of the original name.
    Start,
    /// Only at the end of the original name.
    End,
    /// Every occurrence.
    #[default]
    Anywhere,
}

/// One module instance in the rename chain.
///
/// Each kind is a tagged variant with explicit fields, sharing the
/// `is_effective` / `apply` contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RenameModule {
    /// Zero-padded counter based on batch position.
    Counter {
        /// Value for the first file.
        start: u32,
        /// Increment between files.
        step: u32,
        /// Minimum digits, zero-padded.
        padding: usize,
    },
    /// A literal text fragment.
    SpecifiedText {
        /// The text to insert.
        text: String,
    },
    /// Value of a metadata field, sanitized for filename use.
    MetadataField {
        /// Field name, e.g. `Model` or `DateTimeOriginal`.
        field: String,
        /// Fragment to use when the field is absent.
        fallback: String,
    },
    /// The original name (stem), optionally re-cased.
    OriginalName {
        /// Case transform applied to the original stem.
        case: CaseStyle,
    },
    /// The original name with matching text removed.
    TextRemoval {
        /// Literal text to remove.
        pattern: String,
        /// Where the pattern is matched.
        position: RemovalPosition,
        /// Case-sensitive matching.
        case_sensitive: bool,
    },
}

impl RenameModule {
    /// Whether this module contributes anything under its configuration.
    ///
    /// An ineffective module must contribute an empty fragment regardless
    /// of any other input, and the engine never calls `apply` on it.
    #[must_use]
    pub fn is_effective(&self) -> bool {
        match self {
            Self::Counter { .. } | Self::OriginalName { .. } => true,
            Self::SpecifiedText { text } => !text.is_empty(),
            Self::MetadataField { field, .. } => !field.is_empty(),
            Self::TextRemoval { pattern, .. } => !pattern.is_empty(),
        }
    }

    /// Whether `apply` will consult the metadata record.
    #[must_use]
    pub fn needs_metadata(&self) -> bool {
        matches!(self, Self::MetadataField { .. })
    }

    /// Produce this module's fragment for one file.
    ///
    /// `index` is the file's position within the ordered batch; `metadata`
    /// is only consulted by metadata-dependent modules and may be `None`.
    #[must_use]
    pub fn apply(
        &self,
        file: &FileEntry,
        index: usize,
        metadata: Option<&MetadataRecord>,
    ) -> String {
        if !self.is_effective() {
            return String::new();
        }
        match self {
            Self::Counter {
                start,
                step,
                padding,
            } => {
                let value = u64::from(*start) + u64::from(*step) * index as u64;
                format!("{value:0padding$}", padding = *padding)
            }
            Self::SpecifiedText { text } => text.clone(),
            Self::MetadataField { field, fallback } => metadata
                .and_then(|m| m.get(field))
                .map(sanitize_fragment)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| fallback.clone()),
            Self::OriginalName { case } => case.apply(file.stem()),
            Self::TextRemoval {
                pattern,
                position,
                case_sensitive,
            } => remove_text(file.stem(), pattern, *position, *case_sensitive),
        }
    }
}

/// Strip characters that cannot appear in a filename from a metadata value
/// and collapse runs of whitespace to single underscores.
fn sanitize_fragment(value: &str) -> String {
    static ILLEGAL: OnceLock<Regex> = OnceLock::new();
    let illegal = ILLEGAL.get_or_init(|| {
        Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("static regex")
    });
    let cleaned = illegal.replace_all(value, "");

    static SPACES: OnceLock<Regex> = OnceLock::new();
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    spaces.replace_all(cleaned.trim(), "_").into_owned()
}

fn remove_text(
    stem: &str,
    pattern: &str,
    position: RemovalPosition,
    case_sensitive: bool,
) -> String {
    if case_sensitive {
        match position {
            RemovalPosition::Start => stem
                .strip_prefix(pattern)
                .unwrap_or(stem)
                .to_string(),
            RemovalPosition::End => stem.strip_suffix(pattern).unwrap_or(stem).to_string(),
            RemovalPosition::Anywhere => stem.replace(pattern, ""),
        }
    } else {
        // Case-insensitive matching via an escaped regex keeps multi-byte
        // characters intact where a manual lowercase scan would not
        let escaped = regex::escape(pattern);
        let anchored = match position {
            RemovalPosition::Start => format!("(?i)^{escaped}"),
            RemovalPosition::End => format!("(?i){escaped}$"),
            RemovalPosition::Anywhere => format!("(?i){escaped}"),
        };
        match Regex::new(&anchored) {
            Ok(re) => re.replace_all(stem, "").into_owned(),
            Err(_) => stem.to_string(),
        }
    }
}
