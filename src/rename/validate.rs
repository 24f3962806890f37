//! Candidate filename validation and duplicate detection.
//!
//! Validation is deliberately strict cross-platform: a name that is legal
//! on Linux but breaks when the directory is later synced to a Windows or
//! macOS machine is not worth producing, so Windows rules (reserved device
//! names, trailing dots/spaces, the `<>:"/\|?*` set) apply everywhere.

use std::collections::HashMap;

use thiserror::Error;

/// Maximum filename length in bytes (common filesystem limit).
pub const MAX_FILENAME_LEN: usize = 255;

/// Windows reserved device names, illegal as a filename stem in any case.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Why a candidate filename is invalid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The composed name is empty (all modules ineffective or removal ate
    /// the whole name).
    #[error("empty filename")]
    Empty,

    /// The name contains a character filesystems reject.
    #[error("illegal character {ch:?} in {name:?}")]
    IllegalCharacter {
        /// The offending name.
        name: String,
        /// The offending character.
        ch: char,
    },

    /// The stem is a reserved device name on Windows.
    #[error("{name:?} is a reserved name")]
    Reserved {
        /// The offending name.
        name: String,
    },

    /// The name exceeds the filename length limit.
    #[error("filename too long ({len} bytes, limit {MAX_FILENAME_LEN}): {name:?}")]
    TooLong {
        /// The offending name.
        name: String,
        /// Its length in bytes.
        len: usize,
    },

    /// Windows strips trailing dots and spaces, silently changing the name.
    #[error("trailing dot or space in {name:?}")]
    TrailingDotOrSpace {
        /// The offending name.
        name: String,
    },
}

/// Check one candidate filename against filesystem-validity rules.
pub fn validate_filename(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.chars().all(|c| c == '.') {
        return Err(ValidationError::Empty);
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err(ValidationError::TooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }
    for ch in name.chars() {
        if matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || ch.is_control() {
            return Err(ValidationError::IllegalCharacter {
                name: name.to_string(),
                ch,
            });
        }
    }
    if name.ends_with('.') || name.ends_with(' ') {
        return Err(ValidationError::TrailingDotOrSpace {
            name: name.to_string(),
        });
    }

    let stem = name.split('.').next().unwrap_or(name);
    if RESERVED_NAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(stem))
    {
        return Err(ValidationError::Reserved {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Comparison key for target names.
///
/// On case-insensitive filesystems, `A.jpg` and `a.jpg` collide; the key
/// folds case there so duplicate detection matches what the filesystem
/// will do.
#[must_use]
pub fn name_key(name: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        name.to_lowercase()
    } else {
        name.to_string()
    }
}

/// Indices of batch entries whose target names collide with another
/// entry's target. Every member of a colliding group is flagged, not just
/// the later ones, since the user must see both sides of a conflict.
#[must_use]
pub fn duplicate_target_indices(names: &[String], case_insensitive: bool) -> Vec<usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for name in names {
        *counts.entry(name_key(name, case_insensitive)).or_default() += 1;
    }
    names
        .iter()
        .enumerate()
        .filter(|(_, name)| counts[&name_key(name, case_insensitive)] > 1)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["a.jpg", "001.jpg", "résumé.pdf", "no extension", ".hidden"] {
            assert_eq!(validate_filename(name), Ok(()), "{name} should be valid");
        }
    }

    #[test]
    fn test_empty_and_dot_only() {
        assert_eq!(validate_filename(""), Err(ValidationError::Empty));
        assert_eq!(validate_filename("."), Err(ValidationError::Empty));
        assert_eq!(validate_filename(".."), Err(ValidationError::Empty));
    }

    #[test]
    fn test_illegal_characters() {
        for name in ["a/b.jpg", "a\\b.jpg", "a:b.jpg", "a*b.jpg", "a?b.jpg", "a\tb"] {
            assert!(
                matches!(
                    validate_filename(name),
                    Err(ValidationError::IllegalCharacter { .. })
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_reserved_names() {
        assert!(matches!(
            validate_filename("CON"),
            Err(ValidationError::Reserved { .. })
        ));
        assert!(matches!(
            validate_filename("con.txt"),
            Err(ValidationError::Reserved { .. })
        ));
        assert!(matches!(
            validate_filename("Lpt1.jpg"),
            Err(ValidationError::Reserved { .. })
        ));
        // Not reserved: prefix only matters for the full stem
        assert_eq!(validate_filename("CONFIG.txt"), Ok(()));
    }

    #[test]
    fn test_too_long() {
        let name = "x".repeat(MAX_FILENAME_LEN + 1);
        assert!(matches!(
            validate_filename(&name),
            Err(ValidationError::TooLong { .. })
        ));
        let name = "x".repeat(MAX_FILENAME_LEN);
        assert_eq!(validate_filename(&name), Ok(()));
    }

    #[test]
    fn test_trailing_dot_or_space() {
        assert!(matches!(
            validate_filename("name."),
            Err(ValidationError::TrailingDotOrSpace { .. })
        ));
        assert!(matches!(
            validate_filename("name "),
            Err(ValidationError::TrailingDotOrSpace { .. })
        ));
    }

    #[test]
    fn test_duplicate_detection_flags_all_members() {
        let names = vec![
            "001.jpg".to_string(),
            "002.jpg".to_string(),
            "001.jpg".to_string(),
        ];
        assert_eq!(duplicate_target_indices(&names, false), vec![0, 2]);
    }

    #[test]
    fn test_duplicate_detection_case_insensitive() {
        let names = vec!["A.jpg".to_string(), "a.JPG".to_string()];
        assert_eq!(duplicate_target_indices(&names, true), vec![0, 1]);
        assert!(duplicate_target_indices(&names, false).is_empty());
    }

    #[test]
    fn test_no_duplicates() {
        let names = vec!["a.jpg".to_string(), "b.jpg".to_string()];
        assert!(duplicate_target_indices(&names, true).is_empty());
    }
}
