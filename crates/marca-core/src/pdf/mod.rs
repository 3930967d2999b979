//! PDF text layer access.
//!
//! The extraction engine only ever reads the machine-readable text layer of a
//! document. Anything that can hand out [`PageText`] for a page number can be
//! used as a document source.

mod extractor;

pub use extractor::PdfDocument;

use serde::{Deserialize, Serialize};

use crate::error::PdfError;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Average glyph advance as a fraction of the font's horizontal scale.
pub const AVG_GLYPH_WIDTH_EM: f32 = 0.5;

/// Line height as a multiple of the font's vertical scale.
pub const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// A document whose pages expose positioned text.
pub trait TextLayer {
    /// Number of pages in the document.
    fn page_count(&self) -> u32;

    /// Text layer of a page (1-indexed).
    fn page(&self, number: u32) -> Result<PageText>;
}

/// A run of text positioned in native page space.
///
/// Native space has its origin at the bottom-left of the page with Y growing
/// upward. Width and height are estimates: the text layer carries no tight
/// glyph boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    /// Text content.
    pub text: String,
    /// Baseline start, X.
    pub native_x: f32,
    /// Baseline start, Y.
    pub native_y: f32,
    /// Estimated advance width.
    pub approx_width: f32,
    /// Estimated line height.
    pub approx_height: f32,
}

impl TextFragment {
    /// Build a fragment from its text and a font-scaled text rendering
    /// matrix `[a, b, c, d, e, f]` already expressed in native page space.
    pub fn from_transform(text: impl Into<String>, transform: [f32; 6]) -> Self {
        let text = text.into();
        let [a, b, c, d, e, f] = transform;
        let scale_x = a.hypot(b);
        let scale_y = c.hypot(d);
        let chars = text.chars().count() as f32;

        Self {
            approx_width: chars * scale_x * AVG_GLYPH_WIDTH_EM,
            approx_height: scale_y * LINE_HEIGHT_FACTOR,
            native_x: e,
            native_y: f,
            text,
        }
    }

    /// Estimated bounding box as `(x_min, y_min, x_max, y_max)`.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        (
            self.native_x,
            self.native_y,
            self.native_x + self.approx_width,
            self.native_y + self.approx_height,
        )
    }

    /// Center of the estimated bounding box.
    pub fn centroid(&self) -> (f32, f32) {
        (
            self.native_x + self.approx_width / 2.0,
            self.native_y + self.approx_height / 2.0,
        )
    }
}

/// Page size at some render scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

/// Text layer of a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// Page number (1-indexed).
    pub number: u32,
    /// Page width at scale 1.0.
    pub width: f32,
    /// Page height at scale 1.0.
    pub height: f32,
    /// Positioned text in content-stream order.
    pub fragments: Vec<TextFragment>,
}

impl PageText {
    /// Page size when rendered at `scale`.
    pub fn viewport(&self, scale: f32) -> Viewport {
        Viewport {
            width: self.width * scale,
            height: self.height * scale,
            scale,
        }
    }

    /// Whether the page carries any text at all.
    pub fn has_text(&self) -> bool {
        self.fragments.iter().any(|f| !f.text.trim().is_empty())
    }
}
