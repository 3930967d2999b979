//! Compiled field-role vocabulary.
//!
//! Header words, known-good value tokens and leak patterns are configuration
//! data ([`VocabularyConfig`]); this module turns them into lookups the
//! normalizer and the batch acceptance filter share.

use std::collections::HashSet;

use regex::Regex;

use super::patterns::token_key;
use crate::error::{MarcaError, Result};
use crate::models::config::{Replacement, VocabularyConfig};

/// Vocabulary for one field role, ready for lookups.
#[derive(Debug, Clone)]
pub struct FieldRole {
    names: Vec<String>,
    header_tokens: HashSet<String>,
    valid_tokens: HashSet<String>,
    leak_patterns: Vec<Regex>,
    stale_values: Vec<Regex>,
}

impl FieldRole {
    /// Whether `field` belongs to this role (case-insensitive).
    pub fn applies_to(&self, field: &str) -> bool {
        let key = field.trim().to_uppercase();
        self.names.iter().any(|n| *n == key)
    }

    /// Word is a column/table header for this role.
    pub fn is_header(&self, word: &str) -> bool {
        let key = token_key(word);
        !key.is_empty() && self.header_tokens.contains(&key)
    }

    /// Word is a known-good value for this role.
    pub fn is_valid(&self, word: &str) -> bool {
        let key = token_key(word);
        !key.is_empty() && self.valid_tokens.contains(&key)
    }

    /// Whole value looks like a leaked header.
    pub fn is_leak(&self, text: &str) -> bool {
        let text = text.trim();
        self.leak_patterns.iter().any(|p| p.is_match(text))
    }

    /// Whole value was written by an earlier bad extraction.
    pub fn is_stale(&self, text: &str) -> bool {
        let text = text.trim();
        self.stale_values.iter().any(|p| p.is_match(text)) || self.is_leak(text)
    }
}

/// All field roles plus the artifact replacement table.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    roles: Vec<FieldRole>,
    replacements: Vec<Replacement>,
}

impl Vocabulary {
    /// Compile a vocabulary configuration.
    pub fn compile(config: &VocabularyConfig) -> Result<Self> {
        let mut roles = Vec::with_capacity(config.fields.len());

        for field in &config.fields {
            if field.field.trim().is_empty() {
                return Err(MarcaError::Config(
                    "vocabulary entry with empty field name".to_string(),
                ));
            }

            let names = std::iter::once(&field.field)
                .chain(field.aliases.iter())
                .map(|n| n.trim().to_uppercase())
                .collect();

            roles.push(FieldRole {
                names,
                header_tokens: token_set(&field.header_tokens),
                valid_tokens: token_set(&field.valid_tokens),
                leak_patterns: compile_patterns(&field.field, &field.leak_patterns)?,
                stale_values: compile_patterns(&field.field, &field.stale_values)?,
            });
        }

        Ok(Self {
            roles,
            replacements: config
                .replacements
                .iter()
                .filter(|r| !r.from.is_empty())
                .cloned()
                .collect(),
        })
    }

    /// A vocabulary with no roles and no replacements.
    pub fn empty() -> Self {
        Self {
            roles: Vec::new(),
            replacements: Vec::new(),
        }
    }

    /// Role for a field, if the field has one.
    pub fn role(&self, field: &str) -> Option<&FieldRole> {
        self.roles.iter().find(|r| r.applies_to(field))
    }

    /// Replacements that apply to a field, in table order.
    pub fn replacements_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Replacement> + 'a {
        self.replacements.iter().filter(move |r| match &r.field {
            Some(only) => only.eq_ignore_ascii_case(field.trim()),
            None => true,
        })
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::compile(&VocabularyConfig::default()).expect("built-in vocabulary patterns are valid")
    }
}

fn token_set(tokens: &[String]) -> HashSet<String> {
    tokens
        .iter()
        .map(|t| token_key(t))
        .filter(|t| !t.is_empty())
        .collect()
}

fn compile_patterns(field: &str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                MarcaError::Config(format!("invalid pattern {p:?} for field {field}: {e}"))
            })
        })
        .collect()
}
