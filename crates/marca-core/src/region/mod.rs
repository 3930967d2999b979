//! Region-to-text extraction.
//!
//! A marked region goes through three pure stages:
//! 1. [`transform`]: relative marking space to native page space
//! 2. [`matcher`]: native rectangle to the fragments that belong to it
//! 3. [`normalize`]: fragments to a clean field value
//!
//! [`RegionExtractor`] wires them together with one configuration.

pub mod matcher;
pub mod normalize;
pub mod patterns;
pub mod transform;
pub mod vocabulary;

pub use matcher::{MatchOutcome, MatchTier, SpatialMatcher};
pub use normalize::Normalizer;
pub use transform::{region_to_native, NativeRect, RenderContext};
pub use vocabulary::{FieldRole, Vocabulary};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GeometryError, Result};
use crate::models::config::MarcaConfig;
use crate::models::rules::MarkedRegion;
use crate::pdf::{PageText, TextFragment};

/// Text recovered for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub field_name: String,
    /// Matched fragments joined in reading order.
    pub raw_text: String,
    /// Cleaned value; empty when the field was not found.
    pub cleaned_text: String,
    /// Tier that produced the match.
    pub tier: Option<MatchTier>,
    /// Number of fragments matched after deduplication.
    pub fragment_count: usize,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.cleaned_text.is_empty()
    }
}

/// Extraction pipeline for single regions.
#[derive(Debug, Clone, Default)]
pub struct RegionExtractor {
    matcher: SpatialMatcher,
    normalizer: Normalizer,
}

impl RegionExtractor {
    /// Build from configuration, compiling the vocabulary.
    pub fn new(config: &MarcaConfig) -> Result<Self> {
        let vocabulary = Vocabulary::compile(&config.vocabulary)?;
        Ok(Self {
            matcher: SpatialMatcher::new(config.matching.clone()),
            normalizer: Normalizer::new(config.normalize.clone(), vocabulary),
        })
    }

    /// Build from already constructed stages.
    pub fn from_parts(matcher: SpatialMatcher, normalizer: Normalizer) -> Self {
        Self { matcher, normalizer }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        self.normalizer.vocabulary()
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Native-space rectangle of a region under a render context.
    pub fn locate(&self, region: &MarkedRegion, ctx: &RenderContext) -> std::result::Result<NativeRect, GeometryError> {
        region_to_native(region, ctx, self.matcher.config().aspect_tolerance)
    }

    /// Fragments a region selects, in reading order.
    pub fn matched_fragments<'a>(
        &self,
        region: &MarkedRegion,
        page: &'a PageText,
        ctx: &RenderContext,
    ) -> std::result::Result<Vec<&'a TextFragment>, GeometryError> {
        let rect = self.locate(region, ctx)?;
        Ok(self.matcher.find(&rect, &page.fragments).fragments)
    }

    /// Run the full pipeline for a region on a page rendered as `ctx`.
    pub fn extract(
        &self,
        region: &MarkedRegion,
        page: &PageText,
        ctx: &RenderContext,
    ) -> std::result::Result<ExtractionResult, GeometryError> {
        let rect = self.locate(region, ctx)?;
        let outcome = self.matcher.find(&rect, &page.fragments);

        let texts = outcome.texts();
        let raw_text = Normalizer::assemble(texts.as_slice());
        let cleaned_text = self.normalizer.clean(&region.field_name, &raw_text);

        debug!(
            "field {} on page {}: {} fragments ({}) -> {:?}",
            region.field_name,
            page.number,
            outcome.fragments.len(),
            outcome.tier.map(|t| t.to_string()).unwrap_or_else(|| "none".to_string()),
            cleaned_text
        );

        Ok(ExtractionResult {
            field_name: region.field_name.clone(),
            raw_text,
            cleaned_text,
            tier: outcome.tier,
            fragment_count: outcome.fragments.len(),
        })
    }

    /// Extract against the page as currently rendered on a canvas.
    pub fn preview(
        &self,
        region: &MarkedRegion,
        page: &PageText,
        rendered_width: f32,
        rendered_height: f32,
    ) -> std::result::Result<ExtractionResult, GeometryError> {
        let ctx = RenderContext::for_canvas(page, rendered_width, rendered_height);
        self.extract(region, page, &ctx)
    }

    /// Extract using the render scale stored with the region.
    pub fn extract_at_scale(
        &self,
        region: &MarkedRegion,
        page: &PageText,
    ) -> std::result::Result<ExtractionResult, GeometryError> {
        let ctx = RenderContext::for_page(page, region.render_scale);
        self.extract(region, page, &ctx)
    }
}
