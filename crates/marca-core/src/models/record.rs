//! Structured records updated by batch runs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Field name to value mapping owned by the surrounding application.
pub type StructuredRecord = BTreeMap<String, String>;

/// Reference to a document in a template's collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Stable identifier of the document and its record.
    pub id: String,
    /// Where the document bytes live (path, URL, archive entry).
    pub location: String,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
        }
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Partial update of one record.
///
/// Fields in neither set are left exactly as they were.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    /// Fields to overwrite.
    pub set: BTreeMap<String, String>,
    /// Fields whose stale value must be removed.
    pub clear: BTreeSet<String>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.clear.is_empty()
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        self.clear.remove(&field);
        self.set.insert(field, value.into());
    }

    pub fn clear(&mut self, field: impl Into<String>) {
        let field = field.into();
        self.set.remove(&field);
        self.clear.insert(field);
    }

    /// Apply to a record in place.
    pub fn apply(&self, record: &mut StructuredRecord) {
        for field in &self.clear {
            record.remove(field);
        }
        for (field, value) in &self.set {
            record.insert(field.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_apply_is_partial() {
        let mut record = StructuredRecord::new();
        record.insert("NOMBRE".to_string(), "ANA".to_string());
        record.insert("CATEGORIA".to_string(), "CATEG".to_string());
        record.insert("NOTAS".to_string(), "  keep me ".to_string());

        let mut patch = RecordPatch::default();
        patch.set("NOMBRE", "ANA LUCIA");
        patch.clear("CATEGORIA");
        patch.apply(&mut record);

        assert_eq!(record.get("NOMBRE").map(String::as_str), Some("ANA LUCIA"));
        assert_eq!(record.get("CATEGORIA"), None);
        assert_eq!(record.get("NOTAS").map(String::as_str), Some("  keep me "));
    }

    #[test]
    fn test_set_after_clear_wins() {
        let mut patch = RecordPatch::default();
        patch.clear("CATEGORIA");
        patch.set("CATEGORIA", "B");
        assert!(patch.clear.is_empty());
        assert_eq!(patch.set.len(), 1);
        assert!(!patch.is_empty());
    }
}
