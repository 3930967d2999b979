//! JSON file rule store: one `<template>.json` per template.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Result, RuleSetStore};
use crate::error::StoreError;
use crate::models::rules::RuleSet;

const EXTENSION: &str = "json";

/// Rule sets stored as pretty-printed JSON files in a directory.
#[derive(Debug, Clone)]
pub struct JsonRuleStore {
    dir: PathBuf,
}

impl JsonRuleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a template's rule set.
    pub fn path_for(&self, template_id: &str) -> Result<PathBuf> {
        if !is_valid_template_id(template_id) {
            return Err(StoreError::InvalidTemplateId(template_id.to_string()));
        }
        Ok(self.dir.join(format!("{template_id}.{EXTENSION}")))
    }
}

/// Template ids become file names: letters, digits, `-`, `_` and `.` only,
/// not starting with a dot.
fn is_valid_template_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl RuleSetStore for JsonRuleStore {
    fn load(&self, template_id: &str) -> Result<RuleSet> {
        let path = self.path_for(template_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(template_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&mut self, rule_set: &RuleSet) -> Result<()> {
        let path = self.path_for(&rule_set.template_id)?;
        fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(rule_set)?;
        fs::write(&path, content)?;
        debug!("Saved rule set {} to {}", rule_set.template_id, path.display());
        Ok(())
    }

    fn delete(&mut self, template_id: &str) -> Result<()> {
        let path = self.path_for(template_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(template_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list_templates(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut templates = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_valid_template_id(stem) {
                    templates.push(stem.to_string());
                }
            }
        }
        templates.sort();
        Ok(templates)
    }
}
