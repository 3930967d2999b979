//! Data models: configuration, field rules and structured records.

pub mod config;
pub mod record;
pub mod rules;

pub use config::{BatchConfig, MarcaConfig, MatchConfig, NormalizeConfig, StorageConfig, VocabularyConfig};
pub use record::{DocumentRef, RecordPatch, StructuredRecord};
pub use rules::{FieldRule, MarkedRegion, RuleSet, ValidatedRuleSet};
