//! Accept/reject decisions for extracted field values.
//!
//! A short allow/deny check against the field's vocabulary role. Known-good
//! tokens win over everything else.

use serde::{Deserialize, Serialize};

use crate::region::Vocabulary;

/// Outcome of the acceptance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Value is written to the record.
    Accept,
    /// Nothing was found.
    Empty,
    /// Every word is a header word for the field's role.
    HeaderOnly,
    /// Value matches a known header-leak pattern.
    HeaderLeak,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        self == Verdict::Accept
    }

    /// Verdicts that mark a value as a leaked header.
    pub fn is_leak(self) -> bool {
        matches!(self, Verdict::HeaderOnly | Verdict::HeaderLeak)
    }
}

/// Judge a cleaned value for `field`.
pub fn judge(vocabulary: &Vocabulary, field: &str, value: &str) -> Verdict {
    let value = value.trim();
    if value.is_empty() {
        return Verdict::Empty;
    }

    let Some(role) = vocabulary.role(field) else {
        return Verdict::Accept;
    };

    let words: Vec<&str> = value.split_whitespace().collect();
    if words.iter().any(|w| role.is_valid(w)) {
        return Verdict::Accept;
    }
    if words.iter().all(|w| role.is_header(w)) {
        return Verdict::HeaderOnly;
    }
    if role.is_leak(value) {
        return Verdict::HeaderLeak;
    }

    Verdict::Accept
}

/// Whether a stored value should be removed.
///
/// Only a value that is itself a known leak is cleared, and only when the new
/// extraction produced nothing usable to overwrite it with.
pub fn should_clear(vocabulary: &Vocabulary, field: &str, existing: Option<&str>, verdict: Verdict) -> bool {
    if verdict.is_accepted() {
        return false;
    }
    let Some(existing) = existing.map(str::trim).filter(|v| !v.is_empty()) else {
        return false;
    };

    let stale = vocabulary
        .role(field)
        .is_some_and(|role| role.is_stale(existing));

    stale || judge(vocabulary, field, existing).is_leak()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judge() {
        let vocabulary = Vocabulary::default();

        assert_eq!(judge(&vocabulary, "CATEGORIA", ""), Verdict::Empty);
        assert_eq!(judge(&vocabulary, "CATEGORIA", "   "), Verdict::Empty);
        assert_eq!(judge(&vocabulary, "CATEGORIA", "CATEG."), Verdict::HeaderOnly);
        assert_eq!(judge(&vocabulary, "CATEGORIA", "TIPO DE LICENCIA"), Verdict::HeaderLeak);
        assert_eq!(judge(&vocabulary, "CATEGORIA", "CHOFER"), Verdict::Accept);
        assert_eq!(judge(&vocabulary, "CATEGORIA", "SPORTSMAN 2019"), Verdict::Accept);
        // Unknown fields accept anything non-empty
        assert_eq!(judge(&vocabulary, "NOMBRE", "CATEGORIA"), Verdict::Accept);
    }

    #[test]
    fn test_valid_token_wins_over_header_words() {
        let vocabulary = Vocabulary::default();
        assert_eq!(judge(&vocabulary, "CATEGORIA", "CATEGORIA B"), Verdict::Accept);
        assert_eq!(judge(&vocabulary, "CATEGORIA", "LICENCIA PROFESIONAL"), Verdict::Accept);
    }

    #[test]
    fn test_should_clear() {
        let vocabulary = Vocabulary::default();

        assert!(should_clear(&vocabulary, "CATEGORIA", Some("CATEG"), Verdict::Empty));
        assert!(should_clear(&vocabulary, "CATEGORIA", Some("CATEGORIA:"), Verdict::HeaderOnly));
        assert!(should_clear(&vocabulary, "CATEGORIA", Some("TIPO DE LICENCIA"), Verdict::Empty));

        // Good values and accepted extractions are never cleared
        assert!(!should_clear(&vocabulary, "CATEGORIA", Some("CHOFER"), Verdict::Empty));
        assert!(!should_clear(&vocabulary, "CATEGORIA", Some("CATEG"), Verdict::Accept));
        assert!(!should_clear(&vocabulary, "CATEGORIA", None, Verdict::Empty));
        assert!(!should_clear(&vocabulary, "NOMBRE", Some("CATEG"), Verdict::Empty));
    }
}
