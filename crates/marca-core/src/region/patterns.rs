//! Common regex patterns for text cleanup.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Any run of whitespace, including non-breaking spaces from the text layer
    pub static ref WHITESPACE: Regex = Regex::new(r"[\s\u{00A0}]+").unwrap();

    // Characters ignored when comparing vocabulary tokens
    pub static ref TOKEN_PUNCTUATION: Regex = Regex::new(r"[^\p{L}\p{N}]+").unwrap();
}

/// Collapse whitespace runs to one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Comparison key for a vocabulary token: upper-case, letters and digits only.
pub fn token_key(word: &str) -> String {
    TOKEN_PUNCTUATION.replace_all(word, "").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  A \t\n B\u{00A0}\u{00A0}C  "), "A B C");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_token_key() {
        assert_eq!(token_key("Categ."), "CATEG");
        assert_eq!(token_key("Categoría:"), "CATEGORÍA");
        assert_eq!(token_key("..."), "");
    }
}
