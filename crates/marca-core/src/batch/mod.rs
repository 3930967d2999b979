//! Batch application of a rule set to a template's documents.
//!
//! Documents are processed one at a time. Per-document problems are counted
//! in the [`BatchSummary`]; only an unusable rule set or an empty document
//! collection abort a run.

pub mod acceptance;
#[cfg(feature = "native")]
mod applier;

#[cfg(feature = "native")]
pub use applier::BatchApplier;
pub use acceptance::{judge, should_clear, Verdict};

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LoadError, MergeError, RuleValidationError};
use crate::models::config::BatchConfig;
use crate::models::record::{DocumentRef, RecordPatch, StructuredRecord};
use crate::pdf::TextLayer;

/// Fetches documents for a batch run.
pub trait DocumentLoader {
    type Document: TextLayer;

    /// Load one document.
    fn load(&self, document: &DocumentRef) -> impl Future<Output = Result<Self::Document, LoadError>> + Send;
}

/// Where extracted values end up.
pub trait RecordStore {
    /// Current record for a document, if one exists.
    fn fetch(&self, document: &DocumentRef) -> impl Future<Output = Result<Option<StructuredRecord>, MergeError>> + Send;

    /// Apply a partial update. Returns whether the record changed.
    fn merge(&self, document: &DocumentRef, patch: RecordPatch) -> impl Future<Output = Result<bool, MergeError>> + Send;
}

/// Options for a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Invoke the progress callback every N documents.
    pub progress_interval: usize,
    /// Per-document load timeout.
    pub load_timeout: Option<Duration>,
    /// Checked before every document; once set, the run stops.
    pub stop: Option<Arc<AtomicBool>>,
}

impl BatchOptions {
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(|s| s.load(Ordering::SeqCst))
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from(&BatchConfig::default())
    }
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            progress_interval: config.progress_interval.max(1),
            load_timeout: (config.load_timeout_secs > 0)
                .then(|| Duration::from_secs(config.load_timeout_secs)),
            stop: None,
        }
    }
}

/// Progress snapshot handed to the callback.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
    pub updated: usize,
    pub errors: usize,
    /// Last document processed.
    pub current: String,
}

/// Stage at which a document failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Load,
    Merge,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStage::Load => f.write_str("load"),
            FailureStage::Merge => f.write_str("merge"),
        }
    }
}

/// A document that could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub document: String,
    pub stage: FailureStage,
    pub message: String,
}

/// Result of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub template_id: String,
    /// Documents in the collection.
    pub total: usize,
    /// Documents attempted, including failed ones.
    pub processed: usize,
    /// Documents whose record changed.
    pub updated: usize,
    /// Documents that failed to load or merge.
    pub errors: usize,
    /// Field extractions skipped because of geometry or page problems.
    pub skipped_fields: usize,
    pub failures: Vec<DocumentFailure>,
    /// Rules left out of the run.
    pub rule_errors: Vec<RuleValidationError>,
    /// Run stopped early by the caller.
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchSummary {
    pub fn start(template_id: &str, total: usize, rule_errors: Vec<RuleValidationError>) -> Self {
        let now = Utc::now();
        Self {
            template_id: template_id.to_string(),
            total,
            processed: 0,
            updated: 0,
            errors: 0,
            skipped_fields: 0,
            failures: Vec::new(),
            rule_errors,
            cancelled: false,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn progress(&self, current: &DocumentRef) -> BatchProgress {
        BatchProgress {
            processed: self.processed,
            total: self.total,
            updated: self.updated,
            errors: self.errors,
            current: current.id.clone(),
        }
    }

    /// Documents processed without a failure.
    pub fn succeeded(&self) -> usize {
        self.processed - self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let options = BatchOptions::from(&BatchConfig {
            progress_interval: 0,
            load_timeout_secs: 0,
        });
        assert_eq!(options.progress_interval, 1);
        assert!(options.load_timeout.is_none());

        let options = BatchOptions::default();
        assert_eq!(options.load_timeout, Some(Duration::from_secs(60)));
        assert!(!options.stop_requested());
    }

    #[test]
    fn test_stop_flag() {
        let stop = Arc::new(AtomicBool::new(false));
        let options = BatchOptions::default().with_stop_flag(stop.clone());
        assert!(!options.stop_requested());

        stop.store(true, Ordering::SeqCst);
        assert!(options.stop_requested());
    }
}
