//! Error types for the marca-core library.

use thiserror::Error;

/// Main error type for the marca library.
#[derive(Error, Debug)]
pub enum MarcaError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Coordinate conversion error.
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// A field rule failed validation.
    #[error("rule validation error: {0}")]
    RuleValidation(#[from] RuleValidationError),

    /// Rule set storage error.
    #[error("rule store error: {0}")]
    Store(#[from] StoreError),

    /// Run-level batch failure.
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to read the text layer of a page.
    #[error("failed to read text layer: {0}")]
    TextLayer(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),

    /// The page has no usable MediaBox.
    #[error("page {0} has no valid media box")]
    MissingMediaBox(u32),
}

/// Errors raised while converting a marked region into native page space.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// A page dimension is zero, negative or not finite.
    #[error("invalid {which} dimension: {value}")]
    InvalidDimension { which: &'static str, value: f32 },

    /// Native and rendered page sizes describe different aspect ratios.
    #[error("aspect ratio mismatch: native {native:.4} vs rendered {rendered:.4}")]
    AspectMismatch { native: f32, rendered: f32 },

    /// The marked region has no area or lies outside the unit square.
    #[error("degenerate region for field {field}")]
    DegenerateRegion { field: String },
}

/// A single field rule that cannot be used.
#[derive(Error, Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RuleValidationError {
    /// Region has zero or negative width/height.
    #[error("field {field}: region has no area ({width}x{height})")]
    EmptyRegion { field: String, width: f32, height: f32 },

    /// Region coordinates fall outside the relative [0, 1] range.
    #[error("field {field}: region lies outside the page")]
    OutOfBounds { field: String },

    /// Page number is zero or past the template's page count.
    #[error("field {field}: page {page} out of range 1..={page_count}")]
    PageOutOfRange { field: String, page: u32, page_count: u32 },

    /// Stored render scale is zero, negative or not finite.
    #[error("field {field}: invalid render scale {scale}")]
    InvalidRenderScale { field: String, scale: f32 },

    /// Two rules share a field name.
    #[error("field {field}: defined more than once")]
    DuplicateField { field: String },

    /// Field name is blank.
    #[error("rule with empty field name")]
    EmptyFieldName,
}

impl RuleValidationError {
    /// Field the error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::EmptyRegion { field, .. }
            | Self::OutOfBounds { field }
            | Self::PageOutOfRange { field, .. }
            | Self::InvalidRenderScale { field, .. }
            | Self::DuplicateField { field } => Some(field),
            Self::EmptyFieldName => None,
        }
    }
}

/// A document could not be loaded during a batch run.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The document source could not be read.
    #[error("failed to read {reference}: {reason}")]
    Read { reference: String, reason: String },

    /// The document was read but is not a usable PDF.
    #[error("failed to open {reference}: {source}")]
    Open {
        reference: String,
        #[source]
        source: PdfError,
    },

    /// Loading took longer than the configured timeout.
    #[error("timed out loading {reference} after {seconds}s")]
    Timeout { reference: String, seconds: u64 },
}

/// The record store rejected a merge.
#[derive(Error, Debug)]
#[error("merge rejected for {reference}: {reason}")]
pub struct MergeError {
    pub reference: String,
    pub reason: String,
}

impl MergeError {
    pub fn new(reference: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors related to rule set persistence.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No rule set exists for the template.
    #[error("no rule set for template {0}")]
    NotFound(String),

    /// Template id cannot be used as a storage key.
    #[error("invalid template id: {0:?}")]
    InvalidTemplateId(String),

    /// Stored rule set could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run-aborting batch failures. Everything else is counted in the summary.
#[derive(Error, Debug)]
pub enum BatchError {
    /// The document collection is empty.
    #[error("no documents to process for template {0}")]
    NoDocuments(String),

    /// Every rule in the rule set failed validation.
    #[error("rule set {template} has no valid rules ({} errors)", .errors.len())]
    NoValidRules {
        template: String,
        errors: Vec<RuleValidationError>,
    },
}

/// Result type for the marca library.
pub type Result<T> = std::result::Result<T, MarcaError>;
