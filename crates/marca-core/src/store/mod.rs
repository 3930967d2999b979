//! Rule set persistence.

mod json;

pub use json::JsonRuleStore;

use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::models::rules::RuleSet;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Persists one rule set per template.
pub trait RuleSetStore {
    /// Load the rule set of a template.
    fn load(&self, template_id: &str) -> Result<RuleSet>;

    /// Save a rule set under its own template id, replacing any previous one.
    fn save(&mut self, rule_set: &RuleSet) -> Result<()>;

    /// Delete the rule set of a template.
    fn delete(&mut self, template_id: &str) -> Result<()>;

    /// Template ids with a stored rule set, sorted.
    fn list_templates(&self) -> Result<Vec<String>>;
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleStore {
    rule_sets: BTreeMap<String, RuleSet>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleSetStore for MemoryRuleStore {
    fn load(&self, template_id: &str) -> Result<RuleSet> {
        self.rule_sets
            .get(template_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(template_id.to_string()))
    }

    fn save(&mut self, rule_set: &RuleSet) -> Result<()> {
        self.rule_sets
            .insert(rule_set.template_id.clone(), rule_set.clone());
        Ok(())
    }

    fn delete(&mut self, template_id: &str) -> Result<()> {
        self.rule_sets
            .remove(template_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(template_id.to_string()))
    }

    fn list_templates(&self) -> Result<Vec<String>> {
        Ok(self.rule_sets.keys().cloned().collect())
    }
}
