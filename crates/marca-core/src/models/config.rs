//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for marca.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarcaConfig {
    /// Spatial matching tolerances.
    pub matching: MatchConfig,

    /// Text cleanup parameters.
    pub normalize: NormalizeConfig,

    /// Field vocabulary used by cleanup and acceptance.
    pub vocabulary: VocabularyConfig,

    /// Batch run configuration.
    pub batch: BatchConfig,

    /// Where rule sets and records are kept.
    pub storage: StorageConfig,
}

/// Spatial matcher tolerances.
///
/// The defaults are hand-tuned; dense multi-column layouts may need tighter
/// values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Horizontal slack for the overlap tier, as a fraction of the region edges.
    pub overlap_slack: f32,

    /// Fallback growth as a fraction of the region width/height.
    pub fallback_ratio: f32,

    /// Minimum fallback growth in native units.
    pub fallback_min: f32,

    /// Same-text fragments closer than this are duplicates.
    pub duplicate_distance: f32,

    /// Distances to the region center within this band are ordered by row.
    pub order_tie: f32,

    /// Allowed relative difference between native and rendered aspect ratios.
    pub aspect_tolerance: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            overlap_slack: 0.3,
            fallback_ratio: 0.1,
            fallback_min: 10.0,
            duplicate_distance: 5.0,
            order_tie: 1.0,
            aspect_tolerance: 0.02,
        }
    }
}

/// Text cleanup parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Largest length difference for which a contained word is redundant.
    pub max_length_difference: usize,

    /// Words shorter than this are never collapsed into longer ones.
    pub min_word_length: usize,

    /// Upper-case the cleaned value.
    pub uppercase: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_length_difference: 3,
            min_word_length: 2,
            uppercase: false,
        }
    }
}

/// Field-role vocabulary.
///
/// Keeps the header/value heuristics out of the matching code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    /// Vocabulary per field name.
    pub fields: Vec<FieldVocabulary>,

    /// Literal artifact replacements applied during cleanup.
    pub replacements: Vec<Replacement>,
}

/// Vocabulary for one field role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldVocabulary {
    /// Field name this entry applies to.
    pub field: String,

    /// Other field names sharing the same role.
    pub aliases: Vec<String>,

    /// Column/table header words that are never a value.
    pub header_tokens: Vec<String>,

    /// Words that are known-good values.
    pub valid_tokens: Vec<String>,

    /// Regexes matching whole values that are leaked headers.
    pub leak_patterns: Vec<String>,

    /// Regexes matching values written by earlier bad extractions.
    pub stale_values: Vec<String>,
}

/// A literal replacement for a recurring artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    /// Text to look for.
    pub from: String,

    /// Replacement text.
    pub to: String,

    /// Only apply to this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Replacement {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            field: None,
        }
    }
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        let category = FieldVocabulary {
            field: "CATEGORIA".to_string(),
            aliases: vec!["CATEGORY".to_string(), "TIPO_LICENCIA".to_string()],
            header_tokens: to_strings(&[
                "CATEGORIA", "CATEGORÍA", "CATEG", "CAT", "CATEGORY", "CATEGORIAS", "CATEGORÍAS",
            ]),
            valid_tokens: to_strings(&[
                "A", "A1", "B", "C", "C1", "D", "D1", "E", "E1", "F", "G", "CHOFER", "PROFESIONAL",
                "SPORTSMAN", "MOTOCICLISTA", "PARTICULAR",
            ]),
            leak_patterns: to_strings(&[
                r"^(?i)(TIPO\s+DE\s+)?LICENCIA$",
                r"^(?i)(CAT|CATEG|CATEGOR[IÍ]A)[\s./:]*(DE\s+)?(LICENCIA)?$",
            ]),
            stale_values: to_strings(&[r"^(?i)CATEG\.?$", r"^(?i)CATEGOR[IÍ]A\s*:?$"]),
        };

        Self {
            fields: vec![category],
            replacements: vec![
                Replacement::new("C H O F E R", "CHOFER"),
                Replacement::new("PROFESlONAL", "PROFESIONAL"),
            ],
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Batch run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Report progress every N documents.
    pub progress_interval: usize,

    /// Per-document load timeout in seconds (0 = no timeout).
    pub load_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            progress_interval: 10,
            load_timeout_secs: 60,
        }
    }
}

/// Storage locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON rule set per template.
    pub rules_dir: PathBuf,

    /// Directory holding one JSON record per document.
    pub records_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            rules_dir: PathBuf::from("rules"),
            records_dir: PathBuf::from("records"),
        }
    }
}

impl MarcaConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: MarcaConfig =
            serde_json::from_str(r#"{"matching": {"overlap_slack": 0.5}}"#).unwrap();
        assert_eq!(config.matching.overlap_slack, 0.5);
        assert_eq!(config.matching.fallback_min, 10.0);
        assert_eq!(config.batch.load_timeout_secs, 60);
        assert_eq!(config.vocabulary.fields[0].field, "CATEGORIA");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = MarcaConfig::default();
        config.batch.progress_interval = 25;
        config.save(&path).unwrap();

        let loaded = MarcaConfig::from_file(&path).unwrap();
        assert_eq!(loaded.batch.progress_interval, 25);
        assert_eq!(loaded.vocabulary, config.vocabulary);
    }
}
