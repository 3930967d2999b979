//! Text assembly and cleanup for matched fragments.

use tracing::trace;

use super::patterns::collapse_whitespace;
use super::vocabulary::Vocabulary;
use crate::models::config::NormalizeConfig;

/// Upper bound on cleanup passes. Each pass only removes or shortens text,
/// so real inputs settle in one or two.
const MAX_PASSES: usize = 8;

/// Turns ordered fragment strings into a clean field value.
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizeConfig,
    vocabulary: Vocabulary,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizeConfig::default(), Vocabulary::default())
    }
}

impl Normalizer {
    pub fn new(config: NormalizeConfig, vocabulary: Vocabulary) -> Self {
        Self { config, vocabulary }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Join fragments in reading order with single spaces.
    pub fn assemble<S: AsRef<str>>(fragments: &[S]) -> String {
        let joined = fragments
            .iter()
            .map(|f| f.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        collapse_whitespace(&joined)
    }

    /// Assemble and clean fragments for `field`.
    pub fn normalize<S: AsRef<str>>(&self, field: &str, fragments: &[S]) -> String {
        self.clean(field, &Self::assemble(fragments))
    }

    /// Clean an assembled value for `field`.
    ///
    /// Runs the cleanup pass until the value stops changing, so cleaning a
    /// cleaned value is a no-op. An empty result means the field was not found.
    pub fn clean(&self, field: &str, text: &str) -> String {
        let mut current = collapse_whitespace(text);

        for pass in 0..MAX_PASSES {
            let next = self.clean_once(field, &current);
            if next == current {
                break;
            }
            trace!("cleanup pass {} for {}: {:?} -> {:?}", pass, field, current, next);
            current = next;
        }

        current
    }

    fn clean_once(&self, field: &str, text: &str) -> String {
        let mut words: Vec<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();

        if let Some(role) = self.vocabulary.role(field) {
            words.retain(|w| !role.is_header(w));
        }

        let collapsed = collapse_redundant(&words, &self.config).join(" ");

        let mut value = collapsed;
        for replacement in self.vocabulary.replacements_for(field) {
            if value.contains(&replacement.from) {
                value = value.replace(&replacement.from, &replacement.to);
            }
        }

        let value = collapse_whitespace(&value);
        if self.config.uppercase {
            value.to_uppercase()
        } else {
            value
        }
    }
}

/// Collapse duplicate words and near-duplicates where one contains the other.
///
/// Exact duplicates keep the first occurrence. A word contained in another
/// with at most `max_length_difference` extra characters is replaced by the
/// longer one, keeping the earlier position.
pub fn collapse_redundant<'a>(words: &[&'a str], config: &NormalizeConfig) -> Vec<&'a str> {
    let mut kept: Vec<&'a str> = Vec::with_capacity(words.len());

    for &word in words {
        let upper = word.to_uppercase();
        let len = upper.chars().count();

        let mut absorbed = false;
        for slot in kept.iter_mut() {
            let other = slot.to_uppercase();
            if other == upper {
                absorbed = true;
                break;
            }

            let other_len = other.chars().count();
            if len < config.min_word_length || other_len < config.min_word_length {
                continue;
            }
            if len.abs_diff(other_len) > config.max_length_difference {
                continue;
            }

            if len > other_len && upper.contains(&other) {
                *slot = word;
                absorbed = true;
                break;
            }
            if other_len > len && other.contains(&upper) {
                absorbed = true;
                break;
            }
        }

        if !absorbed {
            kept.push(word);
        }
    }

    kept
}
