//! Sequential batch applier.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::acceptance::{judge, should_clear};
use super::{
    BatchOptions, BatchProgress, BatchSummary, DocumentFailure, DocumentLoader, FailureStage,
    RecordStore,
};
use crate::error::{BatchError, LoadError};
use crate::models::record::{DocumentRef, RecordPatch};
use crate::models::rules::{FieldRule, RuleSet};
use crate::pdf::{PageText, TextLayer};
use crate::region::RegionExtractor;

/// Outcome of one successfully processed document.
struct DocumentOutcome {
    updated: bool,
    skipped_fields: usize,
}

/// Applies a rule set to a collection of documents.
#[derive(Debug, Clone, Default)]
pub struct BatchApplier {
    extractor: RegionExtractor,
    options: BatchOptions,
}

impl BatchApplier {
    pub fn new(extractor: RegionExtractor, options: BatchOptions) -> Self {
        Self { extractor, options }
    }

    pub fn extractor(&self) -> &RegionExtractor {
        &self.extractor
    }

    /// Run the rule set over `documents`.
    ///
    /// `progress` is called every `progress_interval` documents and after the
    /// last one; returning `ControlFlow::Break` stops before the next document.
    /// A set [`BatchOptions::stop`] flag is honored at every document boundary.
    pub async fn run<L, S, F>(
        &self,
        rule_set: &RuleSet,
        documents: &[DocumentRef],
        loader: &L,
        store: &S,
        mut progress: F,
    ) -> Result<BatchSummary, BatchError>
    where
        L: DocumentLoader,
        S: RecordStore,
        F: FnMut(&BatchProgress) -> ControlFlow<()>,
    {
        let validated = rule_set.validate();
        for error in &validated.errors {
            warn!("Skipping rule: {}", error);
        }
        if validated.rules.is_empty() {
            return Err(BatchError::NoValidRules {
                template: rule_set.template_id.clone(),
                errors: validated.errors,
            });
        }
        if documents.is_empty() {
            return Err(BatchError::NoDocuments(rule_set.template_id.clone()));
        }

        info!(
            "Applying {} rules of template {} to {} documents",
            validated.rules.len(),
            rule_set.template_id,
            documents.len()
        );

        let mut summary = BatchSummary::start(&rule_set.template_id, documents.len(), validated.errors);
        let interval = self.options.progress_interval.max(1);

        for document in documents {
            if self.options.stop_requested() {
                info!("Batch stopped after {} documents", summary.processed);
                summary.cancelled = true;
                break;
            }

            match self.apply_document(&validated.rules, document, loader, store).await {
                Ok(outcome) => {
                    summary.skipped_fields += outcome.skipped_fields;
                    if outcome.updated {
                        summary.updated += 1;
                        info!("{}: updated", document);
                    } else {
                        debug!("{}: nothing to merge", document);
                    }
                }
                Err(failure) => {
                    warn!("{}: {} failed: {}", document, failure.stage, failure.message);
                    summary.errors += 1;
                    summary.failures.push(failure);
                }
            }
            summary.processed += 1;

            let is_last = summary.processed == documents.len();
            if (summary.processed % interval == 0 || is_last)
                && progress(&summary.progress(document)).is_break()
            {
                if !is_last {
                    info!("Batch cancelled after {} documents", summary.processed);
                    summary.cancelled = true;
                }
                break;
            }
        }

        summary.finished_at = Utc::now();
        info!(
            "Batch finished: processed={} updated={} errors={}",
            summary.processed, summary.updated, summary.errors
        );

        Ok(summary)
    }

    async fn apply_document<L, S>(
        &self,
        rules: &[FieldRule],
        document: &DocumentRef,
        loader: &L,
        store: &S,
    ) -> Result<DocumentOutcome, DocumentFailure>
    where
        L: DocumentLoader,
        S: RecordStore,
    {
        let loaded = self.load(loader, document).await.map_err(|e| DocumentFailure {
            document: document.id.clone(),
            stage: FailureStage::Load,
            message: e.to_string(),
        })?;

        let existing = match store.fetch(document).await {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                warn!("{}: could not read existing record, stale values are kept: {}", document, e);
                Default::default()
            }
        };

        let vocabulary = self.extractor.vocabulary();
        let mut pages: BTreeMap<u32, PageText> = BTreeMap::new();
        let mut patch = RecordPatch::default();
        let mut skipped_fields = 0;

        for rule in rules {
            let number = rule.region.page_number;
            if number > loaded.page_count() {
                warn!(
                    "{}: field {} is on page {} but the document has {}",
                    document,
                    rule.field_name,
                    number,
                    loaded.page_count()
                );
                skipped_fields += 1;
                continue;
            }

            if !pages.contains_key(&number) {
                match loaded.page(number) {
                    Ok(page) => {
                        pages.insert(number, page);
                    }
                    Err(e) => {
                        warn!("{}: page {} unreadable: {}", document, number, e);
                        skipped_fields += 1;
                        continue;
                    }
                }
            }
            let Some(page) = pages.get(&number) else {
                continue;
            };

            let result = match self.extractor.extract_at_scale(&rule.region, page) {
                Ok(result) => result,
                Err(e) => {
                    warn!("{}: field {} skipped: {}", document, rule.field_name, e);
                    skipped_fields += 1;
                    continue;
                }
            };

            let verdict = judge(vocabulary, &rule.field_name, &result.cleaned_text);
            if verdict.is_accepted() {
                patch.set(rule.field_name.clone(), result.cleaned_text);
            } else if should_clear(
                vocabulary,
                &rule.field_name,
                existing.get(&rule.field_name).map(String::as_str),
                verdict,
            ) {
                debug!("{}: clearing stale value of {}", document, rule.field_name);
                patch.clear(rule.field_name.clone());
            } else {
                debug!("{}: field {} rejected ({:?})", document, rule.field_name, verdict);
            }
        }

        if patch.is_empty() {
            return Ok(DocumentOutcome {
                updated: false,
                skipped_fields,
            });
        }

        let updated = store.merge(document, patch).await.map_err(|e| DocumentFailure {
            document: document.id.clone(),
            stage: FailureStage::Merge,
            message: e.to_string(),
        })?;

        Ok(DocumentOutcome {
            updated,
            skipped_fields,
        })
    }

    async fn load<L: DocumentLoader>(&self, loader: &L, document: &DocumentRef) -> Result<L::Document, LoadError> {
        match self.options.load_timeout {
            Some(limit) => tokio::time::timeout(limit, loader.load(document))
                .await
                .map_err(|_| LoadError::Timeout {
                    reference: document.id.clone(),
                    seconds: limit.as_secs(),
                })?,
            None => loader.load(document).await,
        }
    }
}
