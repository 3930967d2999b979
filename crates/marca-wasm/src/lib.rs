//! WASM bindings for region previews.
//!
//! The marking UI renders pages itself and calls into these bindings to see
//! what text a drawn rectangle would capture, before the rule is saved.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use marca_core::batch::judge;
use marca_core::{
    ExtractionResult, MarcaConfig, MarkedRegion, PdfDocument, RegionExtractor, RuleSet, TextLayer,
    Verdict,
};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Version information.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn to_js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[derive(Serialize)]
struct PreviewResult {
    #[serde(flatten)]
    result: ExtractionResult,
    verdict: Verdict,
}

#[derive(Serialize)]
struct RuleCheck {
    template_id: String,
    valid_fields: Vec<String>,
    errors: Vec<String>,
}

/// Preview one region of a PDF held in memory.
///
/// `region` is a `MarkedRegion` object; the rendered size is the canvas the
/// operator drew on.
#[wasm_bindgen]
pub fn preview_region(
    pdf: &[u8],
    region: JsValue,
    rendered_width: f32,
    rendered_height: f32,
) -> Result<JsValue, JsValue> {
    RegionPreviewer::new(pdf)?.preview(region, rendered_width, rendered_height)
}

/// Clean raw text the way extraction would for `field`.
#[wasm_bindgen]
pub fn normalize_text(field: &str, text: &str) -> String {
    RegionExtractor::default().normalizer().clean(field, text)
}

/// Whether a value would be written to a record for `field`.
#[wasm_bindgen]
pub fn is_acceptable(field: &str, value: &str) -> bool {
    let extractor = RegionExtractor::default();
    judge(extractor.vocabulary(), field, value).is_accepted()
}

/// Check every rule of a rule set; returns valid fields and error messages.
#[wasm_bindgen]
pub fn validate_rule_set(rule_set: JsValue) -> Result<JsValue, JsValue> {
    let rule_set: RuleSet = serde_wasm_bindgen::from_value(rule_set)?;
    let validated = rule_set.validate();

    let check = RuleCheck {
        template_id: validated.template_id,
        valid_fields: validated.rules.into_iter().map(|r| r.field_name).collect(),
        errors: validated.errors.iter().map(|e| e.to_string()).collect(),
    };

    serde_wasm_bindgen::to_value(&check).map_err(to_js_error)
}

/// A loaded PDF kept around while the operator draws regions on it.
#[wasm_bindgen]
pub struct RegionPreviewer {
    document: PdfDocument,
    extractor: RegionExtractor,
}

#[wasm_bindgen]
impl RegionPreviewer {
    /// Parse a PDF with the default configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(pdf: &[u8]) -> Result<RegionPreviewer, JsValue> {
        let document = PdfDocument::load(pdf).map_err(to_js_error)?;
        Ok(Self {
            document,
            extractor: RegionExtractor::default(),
        })
    }

    /// Parse a PDF with a configuration given as a JSON string.
    #[wasm_bindgen]
    pub fn with_config(pdf: &[u8], config_json: &str) -> Result<RegionPreviewer, JsValue> {
        let config: MarcaConfig = serde_json::from_str(config_json).map_err(to_js_error)?;
        let extractor = RegionExtractor::new(&config).map_err(to_js_error)?;
        let document = PdfDocument::load(pdf).map_err(to_js_error)?;
        Ok(Self { document, extractor })
    }

    /// Parse a PDF from a JS byte array.
    #[wasm_bindgen]
    pub fn from_array(pdf: &js_sys::Uint8Array) -> Result<RegionPreviewer, JsValue> {
        Self::new(&pdf.to_vec())
    }

    #[wasm_bindgen(getter)]
    pub fn page_count(&self) -> u32 {
        self.document.page_count()
    }

    /// Page size at scale 1.0 as `{ width, height, scale }`.
    #[wasm_bindgen]
    pub fn page_size(&self, page: u32) -> Result<JsValue, JsValue> {
        let page = self.document.page(page).map_err(to_js_error)?;
        serde_wasm_bindgen::to_value(&page.viewport(1.0)).map_err(to_js_error)
    }

    /// Extraction result plus acceptance verdict for a drawn region.
    #[wasm_bindgen]
    pub fn preview(
        &self,
        region: JsValue,
        rendered_width: f32,
        rendered_height: f32,
    ) -> Result<JsValue, JsValue> {
        let region: MarkedRegion = serde_wasm_bindgen::from_value(region)?;
        let page = self.document.page(region.page_number).map_err(to_js_error)?;

        let result = self
            .extractor
            .preview(&region, &page, rendered_width, rendered_height)
            .map_err(to_js_error)?;
        let verdict = judge(self.extractor.vocabulary(), &region.field_name, &result.cleaned_text);

        serde_wasm_bindgen::to_value(&PreviewResult { result, verdict }).map_err(to_js_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("CATEGORIA", "CATEGORIA  CHOFE CHOFER"), "CHOFER");
        assert_eq!(normalize_text("NOMBRE", " ANA   LUCIA "), "ANA LUCIA");
    }

    #[wasm_bindgen_test]
    fn test_is_acceptable() {
        assert!(is_acceptable("CATEGORIA", "PROFESIONAL"));
        assert!(!is_acceptable("CATEGORIA", "CATEGORIA"));
        assert!(!is_acceptable("CATEGORIA", ""));
    }

    #[wasm_bindgen_test]
    fn test_rejects_garbage_pdf() {
        assert!(RegionPreviewer::new(b"not a pdf").is_err());
    }

    #[wasm_bindgen_test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
