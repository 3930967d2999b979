//! Batch applier behavior against in-memory documents and records.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use marca_core::batch::FailureStage;
use marca_core::pdf;
use marca_core::{
    BatchApplier, BatchError, BatchOptions, DocumentLoader, DocumentRef, FieldRule, LoadError,
    MarkedRegion, MergeError, PageText, RecordPatch, RecordStore, RegionExtractor, RuleSet,
    StructuredRecord, TextFragment, TextLayer,
};
use pretty_assertions::assert_eq;

struct MockDocument {
    pages: Vec<PageText>,
}

impl TextLayer for MockDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page(&self, number: u32) -> pdf::Result<PageText> {
        number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .cloned()
            .ok_or(marca_core::PdfError::InvalidPage(number))
    }
}

#[derive(Default)]
struct MockLoader {
    pages: HashMap<String, PageText>,
    broken: HashSet<String>,
    slow: HashSet<String>,
    /// Raise the flag while loading this document.
    stop_on: Option<(String, Arc<AtomicBool>)>,
}

impl MockLoader {
    fn with(mut self, id: &str, page: PageText) -> Self {
        self.pages.insert(id.to_string(), page);
        self
    }
}

impl DocumentLoader for MockLoader {
    type Document = MockDocument;

    async fn load(&self, document: &DocumentRef) -> Result<MockDocument, LoadError> {
        if let Some((id, stop)) = &self.stop_on {
            if *id == document.id {
                stop.store(true, Ordering::SeqCst);
            }
        }
        if self.slow.contains(&document.id) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.broken.contains(&document.id) {
            return Err(LoadError::Read {
                reference: document.id.clone(),
                reason: "connection reset".to_string(),
            });
        }
        let page = self.pages.get(&document.id).cloned().ok_or_else(|| LoadError::Read {
            reference: document.id.clone(),
            reason: "missing".to_string(),
        })?;
        Ok(MockDocument { pages: vec![page] })
    }
}

#[derive(Default)]
struct MemoryRecords {
    records: Mutex<HashMap<String, StructuredRecord>>,
    read_only: HashSet<String>,
}

impl MemoryRecords {
    fn insert(&self, id: &str, fields: &[(&str, &str)]) {
        let record = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.records.lock().unwrap().insert(id.to_string(), record);
    }

    fn get(&self, id: &str) -> Option<StructuredRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }
}

impl RecordStore for MemoryRecords {
    async fn fetch(&self, document: &DocumentRef) -> Result<Option<StructuredRecord>, MergeError> {
        Ok(self.records.lock().unwrap().get(&document.id).cloned())
    }

    async fn merge(&self, document: &DocumentRef, patch: RecordPatch) -> Result<bool, MergeError> {
        if self.read_only.contains(&document.id) {
            return Err(MergeError::new(document.id.clone(), "record is locked"));
        }
        let mut records = self.records.lock().unwrap();
        let record = records.entry(document.id.clone()).or_default();
        let before = record.clone();
        patch.apply(record);
        Ok(*record != before)
    }
}

fn fragment(text: &str, x: f32, y: f32) -> TextFragment {
    TextFragment::from_transform(text, [10.0, 0.0, 0.0, 10.0, x, y])
}

/// Page with a category value inside the marked region.
fn value_page(value: &str) -> PageText {
    PageText {
        number: 1,
        width: 600.0,
        height: 800.0,
        fragments: vec![
            fragment("CATEGORIA", 100.0, 700.0),
            fragment(value, 140.0, 680.0),
        ],
    }
}

/// Page where the region only covers the column header.
fn header_page() -> PageText {
    PageText {
        number: 1,
        width: 600.0,
        height: 800.0,
        fragments: vec![fragment("CATEGORIA", 100.0, 675.0)],
    }
}

fn category_rules() -> RuleSet {
    let mut rule_set = RuleSet::new("ORG-01", 1);
    rule_set.add_rule(FieldRule::new(MarkedRegion::new(
        "CATEGORIA",
        1,
        90.0 / 600.0,
        110.0 / 800.0,
        100.0 / 600.0,
        30.0 / 800.0,
    )));
    rule_set
}

fn documents(count: usize) -> Vec<DocumentRef> {
    (1..=count)
        .map(|i| DocumentRef::new(format!("doc-{i:02}"), format!("/docs/doc-{i:02}.pdf")))
        .collect()
}

fn applier(options: BatchOptions) -> BatchApplier {
    BatchApplier::new(RegionExtractor::default(), options)
}

fn continue_always(_: &marca_core::BatchProgress) -> ControlFlow<()> {
    ControlFlow::Continue(())
}

#[tokio::test]
async fn failed_load_does_not_abort_the_batch() {
    let docs = documents(10);
    let mut loader = docs
        .iter()
        .fold(MockLoader::default(), |l, d| l.with(&d.id, value_page("CHOFER")));
    loader.broken.insert("doc-05".to_string());
    let records = MemoryRecords::default();

    let summary = applier(BatchOptions::default())
        .run(&category_rules(), &docs, &loader, &records, continue_always)
        .await
        .unwrap();

    assert_eq!(summary.processed, 10);
    assert_eq!(summary.updated, 9);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].document, "doc-05");
    assert_eq!(summary.failures[0].stage, FailureStage::Load);
    assert!(!summary.cancelled);

    for doc in &docs {
        let value = records.get(&doc.id).and_then(|r| r.get("CATEGORIA").cloned());
        if doc.id == "doc-05" {
            assert_eq!(value, None);
        } else {
            assert_eq!(value.as_deref(), Some("CHOFER"));
        }
    }
}

#[tokio::test]
async fn merge_only_touches_accepted_fields() {
    let docs = documents(1);
    let loader = MockLoader::default().with("doc-01", value_page("PROFESIONAL"));
    let records = MemoryRecords::default();
    records.insert(
        "doc-01",
        &[("NOMBRE", "ANA LUCIA"), ("NOTAS", "  revisar  "), ("CATEGORIA", "B")],
    );

    let summary = applier(BatchOptions::default())
        .run(&category_rules(), &docs, &loader, &records, continue_always)
        .await
        .unwrap();

    assert_eq!(summary.updated, 1);
    let record = records.get("doc-01").unwrap();
    assert_eq!(record.get("CATEGORIA").map(String::as_str), Some("PROFESIONAL"));
    assert_eq!(record.get("NOMBRE").map(String::as_str), Some("ANA LUCIA"));
    assert_eq!(record.get("NOTAS").map(String::as_str), Some("  revisar  "));
    assert_eq!(record.len(), 3);
}

#[tokio::test]
async fn stale_header_leak_is_cleared() {
    let docs = documents(2);
    let loader = MockLoader::default()
        .with("doc-01", header_page())
        .with("doc-02", header_page());
    let records = MemoryRecords::default();
    records.insert("doc-01", &[("CATEGORIA", "CATEG"), ("NOMBRE", "ANA")]);
    records.insert("doc-02", &[("CATEGORIA", "C1")]);

    let summary = applier(BatchOptions::default())
        .run(&category_rules(), &docs, &loader, &records, continue_always)
        .await
        .unwrap();

    // Only the leaked value is removed; a good value is never cleared
    assert_eq!(summary.updated, 1);
    let first = records.get("doc-01").unwrap();
    assert_eq!(first.get("CATEGORIA"), None);
    assert_eq!(first.get("NOMBRE").map(String::as_str), Some("ANA"));
    assert_eq!(
        records.get("doc-02").unwrap().get("CATEGORIA").map(String::as_str),
        Some("C1")
    );
}

#[tokio::test]
async fn empty_collection_is_an_error() {
    let result = applier(BatchOptions::default())
        .run(&category_rules(), &[], &MockLoader::default(), &MemoryRecords::default(), continue_always)
        .await;

    assert!(matches!(result, Err(BatchError::NoDocuments(t)) if t == "ORG-01"));
}

#[tokio::test]
async fn rule_set_without_valid_rules_is_an_error() {
    let mut rule_set = RuleSet::new("ORG-01", 1);
    rule_set.add_rule(FieldRule::new(MarkedRegion::new("CATEGORIA", 1, 0.1, 0.1, 0.0, 0.1)));

    let result = applier(BatchOptions::default())
        .run(&rule_set, &documents(3), &MockLoader::default(), &MemoryRecords::default(), continue_always)
        .await;

    match result {
        Err(BatchError::NoValidRules { template, errors }) => {
            assert_eq!(template, "ORG-01");
            assert_eq!(errors.len(), 1);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn invalid_rules_are_reported_and_skipped() {
    let mut rule_set = category_rules();
    rule_set.add_rule(FieldRule::new(MarkedRegion::new("FECHA", 4, 0.1, 0.1, 0.2, 0.1)));
    let docs = documents(1);
    let loader = MockLoader::default().with("doc-01", value_page("B"));
    let records = MemoryRecords::default();

    let summary = applier(BatchOptions::default())
        .run(&rule_set, &docs, &loader, &records, continue_always)
        .await
        .unwrap();

    assert_eq!(summary.rule_errors.len(), 1);
    assert_eq!(summary.rule_errors[0].field(), Some("FECHA"));
    assert_eq!(summary.updated, 1);
}

#[tokio::test]
async fn progress_callback_can_cancel() {
    let docs = documents(10);
    let loader = docs
        .iter()
        .fold(MockLoader::default(), |l, d| l.with(&d.id, value_page("CHOFER")));
    let records = MemoryRecords::default();
    let options = BatchOptions {
        progress_interval: 1,
        load_timeout: None,
        ..Default::default()
    };

    let mut seen = Vec::new();
    let summary = applier(options)
        .run(&category_rules(), &docs, &loader, &records, |progress| {
            seen.push(progress.processed);
            if progress.processed == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await
        .unwrap();

    assert_eq!(seen, vec![1, 2, 3]);
    assert!(summary.cancelled);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.total, 10);
    assert!(records.get("doc-04").is_none());
}

#[tokio::test]
async fn stop_flag_is_checked_between_progress_reports() {
    let docs = documents(10);
    let stop = Arc::new(AtomicBool::new(false));
    let mut loader = docs
        .iter()
        .fold(MockLoader::default(), |l, d| l.with(&d.id, value_page("CHOFER")));
    loader.stop_on = Some(("doc-02".to_string(), stop.clone()));
    let records = MemoryRecords::default();
    let options = BatchOptions::default().with_stop_flag(stop);

    let mut calls = 0;
    let summary = applier(options)
        .run(&category_rules(), &docs, &loader, &records, |_| {
            calls += 1;
            ControlFlow::Continue(())
        })
        .await
        .unwrap();

    assert_eq!(calls, 0);
    assert!(summary.cancelled);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.updated, 2);
    assert_eq!(records.get("doc-02").unwrap()["CATEGORIA"], "CHOFER");
    assert!(records.get("doc-03").is_none());
}

#[tokio::test]
async fn progress_reported_every_interval_and_at_end() {
    let docs = documents(5);
    let loader = docs
        .iter()
        .fold(MockLoader::default(), |l, d| l.with(&d.id, value_page("CHOFER")));
    let options = BatchOptions {
        progress_interval: 2,
        load_timeout: None,
        ..Default::default()
    };

    let mut seen = Vec::new();
    applier(options)
        .run(&category_rules(), &docs, &loader, &MemoryRecords::default(), |progress| {
            seen.push((progress.processed, progress.current.clone()));
            ControlFlow::Continue(())
        })
        .await
        .unwrap();

    assert_eq!(
        seen,
        vec![
            (2, "doc-02".to_string()),
            (4, "doc-04".to_string()),
            (5, "doc-05".to_string()),
        ]
    );
}

#[tokio::test]
async fn slow_load_times_out() {
    let docs = documents(3);
    let mut loader = docs
        .iter()
        .fold(MockLoader::default(), |l, d| l.with(&d.id, value_page("CHOFER")));
    loader.slow.insert("doc-02".to_string());
    let options = BatchOptions {
        progress_interval: 10,
        load_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };

    let summary = applier(options)
        .run(&category_rules(), &docs, &loader, &MemoryRecords::default(), continue_always)
        .await
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.errors, 1);
    assert!(summary.failures[0].message.contains("timed out"));
}

#[tokio::test]
async fn rejected_merge_is_counted() {
    let docs = documents(3);
    let loader = docs
        .iter()
        .fold(MockLoader::default(), |l, d| l.with(&d.id, value_page("CHOFER")));
    let records = MemoryRecords {
        read_only: HashSet::from(["doc-01".to_string()]),
        ..Default::default()
    };

    let summary = applier(BatchOptions::default())
        .run(&category_rules(), &docs, &loader, &records, continue_always)
        .await
        .unwrap();

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.failures[0].stage, FailureStage::Merge);
    assert_eq!(summary.succeeded(), 2);
}

#[tokio::test]
async fn rules_past_the_last_page_are_skipped() {
    let mut rule_set = RuleSet::new("ORG-01", 2);
    rule_set.add_rule(category_rules().rules.remove(0));
    rule_set.add_rule(FieldRule::new(MarkedRegion::new("FIRMA", 2, 0.1, 0.1, 0.2, 0.1)));
    let docs = documents(1);
    let loader = MockLoader::default().with("doc-01", value_page("CHOFER"));

    let summary = applier(BatchOptions::default())
        .run(&rule_set, &docs, &loader, &MemoryRecords::default(), continue_always)
        .await
        .unwrap();

    assert_eq!(summary.skipped_fields, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.errors, 0);
}
