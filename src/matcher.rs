//! Boundary-aware matching of indicators against message text.
//!
//! A match counts only when the indicator occupies a whole hostname token. Token
//! characters are alphanumerics plus `.`, `-` and `_`; everything else
//! (whitespace, punctuation, markup, start/end of text) is a boundary. A single
//! trailing `.` followed by a boundary is treated as sentence punctuation.
//!
//! ```
//! use threat_sweep::matcher::matches;
//! use threat_sweep::{Indicator, IndicatorSet};
//!
//! let set: IndicatorSet = [Indicator::domain("domain.com").unwrap()].into_iter().collect();
//!
//! assert!(matches("see domain.com.", &set));
//! assert!(!matches("sub.domain.com", &set));
//! assert!(!matches("domain.com.bad", &set));
//! assert!(!matches("notdomain.com", &set));
//! ```

use crate::indicator::{Indicator, IndicatorSet};

/// Returns `true` if `text` contains any indicator from `indicators` as a whole token.
///
/// Builds a throwaway [`IndicatorMatcher`]; callers testing many texts against
/// the same set should build the matcher once instead.
#[must_use]
pub fn matches(text: &str, indicators: &IndicatorSet) -> bool {
    if text.is_empty() || indicators.is_empty() {
        return false;
    }
    IndicatorMatcher::new(indicators).is_match(text)
}

/// Matches text against a fixed list of indicators.
#[derive(Debug, Clone, Default)]
pub struct IndicatorMatcher {
    needles: Vec<Indicator>,
}

impl IndicatorMatcher {
    /// Takes a snapshot of `indicators`. Their text is already lowercase.
    #[must_use]
    pub fn new(indicators: &IndicatorSet) -> Self {
        Self {
            needles: indicators.iter().cloned().collect(),
        }
    }

    /// Returns the first indicator found in `text`, if any.
    #[must_use]
    pub fn find_match(&self, text: &str) -> Option<&Indicator> {
        if text.is_empty() || self.needles.is_empty() {
            return None;
        }
        let haystack = text.to_lowercase();
        self.needles
            .iter()
            .find(|needle| contains_token(&haystack, needle.as_str()))
    }

    /// Returns `true` if any indicator occurs in `text` as a whole token.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.find_match(text).is_some()
    }

    /// Returns the number of usable indicators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.needles.len()
    }

    /// Returns `true` if no usable indicators remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.needles.is_empty()
    }
}

/// Returns `true` if `needle` occurs in `haystack` delimited by boundaries on both sides.
///
/// Both arguments must already be lowercase. Non-overlapping search is enough:
/// an overlapping occurrence would be preceded by a character of the previous
/// occurrence, and indicators consist of token characters only.
#[must_use]
pub fn contains_token(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = &haystack[start + needle.len()..];
        before.map_or(true, |c| !is_token_char(c)) && ends_at_boundary(after)
    })
}

/// Checks the text following an occurrence.
fn ends_at_boundary(after: &str) -> bool {
    let mut chars = after.chars();
    match chars.next() {
        None => true,
        Some('.') => chars.next().map_or(true, |c| !is_token_char(c)),
        Some(c) => !is_token_char(c),
    }
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '.' | '-' | '_')
}
