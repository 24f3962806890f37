//! Final name transform.
//!
//! Applied once to the concatenated stem after all module fragments are
//! joined: first the case change, then separator rewriting. The extension
//! is never touched here; the engine re-attaches it verbatim.

/// Case transform for the composed stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaseStyle {
    /// Leave casing as composed.
    #[default]
    Keep,
    /// All lowercase.
    Lower,
    /// ALL UPPERCASE.
    Upper,
    /// First letter uppercase, rest lowercase.
    Capitalize,
}

impl CaseStyle {
    /// Apply the case transform to `s`.
    #[must_use]
    pub fn apply(self, s: &str) -> String {
        match self {
            Self::Keep => s.to_string(),
            Self::Lower => s.to_lowercase(),
            Self::Upper => s.to_uppercase(),
            Self::Capitalize => {
                let mut chars = s.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_uppercase().collect::<String>()
                            + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            }
        }
    }
}

/// Separator rewriting for the composed stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SeparatorStyle {
    /// Leave separators as composed.
    #[default]
    Keep,
    /// Spaces become underscores.
    Underscores,
    /// Underscores become spaces.
    Spaces,
    /// Spaces and underscores become dashes.
    Dashes,
}

impl SeparatorStyle {
    /// Apply the separator transform to `s`.
    #[must_use]
    pub fn apply(self, s: &str) -> String {
        match self {
            Self::Keep => s.to_string(),
            Self::Underscores => s.replace(' ', "_"),
            Self::Spaces => s.replace('_', " "),
            Self::Dashes => s.replace([' ', '_'], "-"),
        }
    }
}

/// The single post-compose transform: case, then separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PostTransform {
    /// Case change.
    pub case: CaseStyle,
    /// Separator rewriting.
    pub separator: SeparatorStyle,
}

impl PostTransform {
    /// Whether this transform changes anything at all.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.case == CaseStyle::Keep && self.separator == SeparatorStyle::Keep
    }

    /// Apply to a composed stem.
    #[must_use]
    pub fn apply(&self, stem: &str) -> String {
        self.separator.apply(&self.case.apply(stem))
    }
}
