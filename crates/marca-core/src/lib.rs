//! Core library for template-driven field extraction from PDF text layers.
//!
//! This crate provides:
//! - PDF text layer access (positioned text fragments per page)
//! - Region extraction: marked region to native space, spatial matching and
//!   text cleanup
//! - Field rules and rule sets per document template, with persistence
//! - Batch application of a rule set across a template's documents

pub mod batch;
pub mod error;
pub mod models;
pub mod pdf;
pub mod region;
pub mod store;

pub use error::{
    BatchError, GeometryError, LoadError, MarcaError, MergeError, PdfError, Result,
    RuleValidationError, StoreError,
};
pub use models::config::MarcaConfig;
pub use models::record::{DocumentRef, RecordPatch, StructuredRecord};
pub use models::rules::{FieldRule, MarkedRegion, RuleSet, ValidatedRuleSet};
pub use pdf::{PageText, PdfDocument, TextFragment, TextLayer};
pub use region::{ExtractionResult, MatchTier, NativeRect, Normalizer, RegionExtractor, RenderContext, Vocabulary};
pub use store::{JsonRuleStore, MemoryRuleStore, RuleSetStore};
pub use batch::{
    BatchOptions, BatchProgress, BatchSummary, DocumentFailure, DocumentLoader, RecordStore, Verdict,
};
#[cfg(feature = "native")]
pub use batch::BatchApplier;
