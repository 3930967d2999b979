//! Positioned text extraction using lopdf.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use super::{AVG_GLYPH_WIDTH_EM, PageText, Result, TextFragment, TextLayer};
use crate::error::PdfError;

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Page tree nesting deeper than this is treated as malformed.
const MAX_TREE_DEPTH: usize = 32;

/// A loaded PDF exposing its text layer page by page.
pub struct PdfDocument {
    document: Document,
    pages: BTreeMap<u32, ObjectId>,
}

impl PdfDocument {
    /// Parse a PDF from memory.
    pub fn load(data: &[u8]) -> Result<Self> {
        let mut document = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        if document.is_encrypted() {
            if document.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
        }

        let pages = document.get_pages();
        if pages.is_empty() {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", pages.len());
        Ok(Self { document, pages })
    }

    /// Visible page box `(llx, lly, urx, ury)`, preferring CropBox over MediaBox.
    fn page_box(&self, page_id: ObjectId) -> Option<[f32; 4]> {
        let media = self
            .inherited(page_id, b"MediaBox")
            .and_then(|obj| self.rectangle(obj))?;

        let visible = self
            .inherited(page_id, b"CropBox")
            .and_then(|obj| self.rectangle(obj))
            .map(|crop| {
                [
                    crop[0].max(media[0]),
                    crop[1].max(media[1]),
                    crop[2].min(media[2]),
                    crop[3].min(media[3]),
                ]
            })
            .filter(|b| b[2] > b[0] && b[3] > b[1])
            .unwrap_or(media);

        Some(visible)
    }

    /// Look up a page attribute, walking up the page tree for inherited values.
    fn inherited(&self, node_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = Some(node_id);

        for _ in 0..MAX_TREE_DEPTH {
            let dict = self.document.get_dictionary(current?).ok()?;

            if let Ok(value) = dict.get(key) {
                if let Ok((_, object)) = self.document.dereference(value) {
                    return Some(object);
                }
            }

            // Continue up the tree
            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }

        None
    }

    fn rectangle(&self, object: &Object) -> Option<[f32; 4]> {
        let Object::Array(items) = object else {
            return None;
        };
        if items.len() != 4 {
            return None;
        }

        let mut values = [0.0f32; 4];
        for (slot, item) in values.iter_mut().zip(items) {
            let (_, item) = self.document.dereference(item).ok()?;
            *slot = number(item)?;
        }

        // Normalize corner order
        Some([
            values[0].min(values[2]),
            values[1].min(values[3]),
            values[0].max(values[2]),
            values[1].max(values[3]),
        ])
    }

    fn read_fragments(&self, page_id: ObjectId, origin: (f32, f32)) -> Result<Vec<TextFragment>> {
        let fonts = self.document.get_page_fonts(page_id).unwrap_or_default();

        let content_data = self
            .document
            .get_page_content(page_id)
            .map_err(|e| PdfError::TextLayer(e.to_string()))?;

        let content =
            Content::decode(&content_data).map_err(|e| PdfError::TextLayer(e.to_string()))?;

        let mut walker = ContentWalker::new(&self.document, &fonts, origin);
        for op in &content.operations {
            walker.apply(op);
        }

        Ok(walker.fragments)
    }
}

impl TextLayer for PdfDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page(&self, number: u32) -> Result<PageText> {
        let page_id = *self.pages.get(&number).ok_or(PdfError::InvalidPage(number))?;

        let [llx, lly, urx, ury] = self
            .page_box(page_id)
            .ok_or(PdfError::MissingMediaBox(number))?;

        // TODO: apply /Rotate to the page size and fragment positions for rotated pages.
        let fragments = self.read_fragments(page_id, (llx, lly))?;

        trace!("Page {}: {} text fragments", number, fragments.len());

        Ok(PageText {
            number,
            width: urx - llx,
            height: ury - lly,
            fragments,
        })
    }
}

/// Graphics and text state tracked while walking a content stream.
struct ContentWalker<'a> {
    document: &'a Document,
    fonts: &'a BTreeMap<Vec<u8>, &'a Dictionary>,
    origin: (f32, f32),
    ctm: Matrix,
    ctm_stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font: Vec<u8>,
    font_size: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
    fragments: Vec<TextFragment>,
}

impl<'a> ContentWalker<'a> {
    fn new(
        document: &'a Document,
        fonts: &'a BTreeMap<Vec<u8>, &'a Dictionary>,
        origin: (f32, f32),
    ) -> Self {
        Self {
            document,
            fonts,
            origin,
            ctm: IDENTITY,
            ctm_stack: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            font: Vec::new(),
            font_size: 12.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            fragments: Vec::new(),
        }
    }

    fn apply(&mut self, op: &Operation) {
        let operands = &op.operands;

        match op.operator.as_str() {
            "q" => self.ctm_stack.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.ctm_stack.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(m) = matrix(operands) {
                    self.ctm = concat(&m, &self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "Tf" => {
                if operands.len() >= 2 {
                    if let Ok(name) = operands[0].as_name() {
                        self.font = name.to_vec();
                    }
                    if let Some(size) = number(&operands[1]) {
                        self.font_size = size;
                    }
                }
            }
            "Tz" => {
                if let Some(scale) = operands.first().and_then(number) {
                    self.horizontal_scale = scale / 100.0;
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    self.leading = leading;
                }
            }
            "Ts" => {
                if let Some(rise) = operands.first().and_then(number) {
                    self.rise = rise;
                }
            }
            "Td" | "TD" => {
                if operands.len() >= 2 {
                    let tx = number(&operands[0]).unwrap_or(0.0);
                    let ty = number(&operands[1]).unwrap_or(0.0);
                    if op.operator == "TD" {
                        self.leading = -ty;
                    }
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = matrix(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(operand) = operands.first() {
                    let text = self.decode(operand).unwrap_or_default();
                    self.show(text, 0.0);
                }
            }
            "TJ" => {
                if let Some(Ok(items)) = operands.first().map(Object::as_array) {
                    let mut combined = String::new();
                    let mut adjustment = 0.0;
                    for item in items {
                        if let Some(offset) = number(item) {
                            adjustment += offset;
                        } else if let Some(text) = self.decode(item) {
                            combined.push_str(&text);
                        }
                    }
                    self.show(combined, adjustment);
                }
            }
            "'" => {
                self.next_line();
                if let Some(operand) = operands.first() {
                    let text = self.decode(operand).unwrap_or_default();
                    self.show(text, 0.0);
                }
            }
            "\"" => {
                self.next_line();
                if let Some(operand) = operands.get(2) {
                    let text = self.decode(operand).unwrap_or_default();
                    self.show(text, 0.0);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = concat(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = if self.leading != 0.0 {
            self.leading
        } else {
            self.font_size * super::LINE_HEIGHT_FACTOR
        };
        self.move_line(0.0, -leading);
    }

    /// Emit a fragment at the current text position and advance past it.
    ///
    /// `adjustment` is the summed TJ spacing in thousandths of text space.
    fn show(&mut self, text: String, adjustment: f32) {
        let chars = text.chars().count() as f32;

        if !text.trim().is_empty() {
            let font_matrix = [
                self.font_size * self.horizontal_scale,
                0.0,
                0.0,
                self.font_size,
                0.0,
                self.rise,
            ];
            let rendering = concat(&font_matrix, &concat(&self.text_matrix, &self.ctm));
            let transform = [
                rendering[0],
                rendering[1],
                rendering[2],
                rendering[3],
                rendering[4] - self.origin.0,
                rendering[5] - self.origin.1,
            ];
            self.fragments.push(TextFragment::from_transform(text, transform));
        }

        let advance = (chars * AVG_GLYPH_WIDTH_EM - adjustment / 1000.0)
            * self.font_size
            * self.horizontal_scale;
        self.text_matrix = concat(&[1.0, 0.0, 0.0, 1.0, advance, 0.0], &self.text_matrix);
    }

    /// Decode a string operand through the current font's encoding.
    fn decode(&self, obj: &Object) -> Option<String> {
        let Object::String(bytes, _) = obj else {
            return None;
        };

        if let Some(font_dict) = self.fonts.get(&self.font) {
            if let Ok(encoding) = font_dict.get_font_encoding(self.document) {
                if let Ok(text) = Document::decode_text(&encoding, bytes) {
                    return Some(text);
                }
            }
        }

        // Fallback: try UTF-16BE then Latin-1
        if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
            let utf16: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                .collect();
            return Some(String::from_utf16_lossy(&utf16));
        }

        Some(bytes.iter().map(|&b| b as char).collect())
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn matrix(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, operand) in m.iter_mut().zip(operands) {
        *slot = number(operand)?;
    }
    Some(m)
}

/// `a × b` in PDF row-vector convention.
fn concat(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Stream, dictionary};

    /// Build a single-page PDF with one text run per entry `(text, x, y, size)`.
    fn sample_pdf(runs: &[(&str, f32, f32, f32)], media_box: [i64; 4]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut operations = Vec::new();
        for (text, x, y, size) in runs {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), (*size).into()]));
            operations.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => media_box.iter().map(|&v| Object::Integer(v)).collect::<Vec<_>>(),
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_load_rejects_garbage() {
        assert!(matches!(PdfDocument::load(b"not a pdf"), Err(PdfError::Parse(_))));
    }

    #[test]
    fn test_page_size_inherited_media_box() {
        let data = sample_pdf(&[("CATEGORIA", 50.0, 700.0, 10.0)], [0, 0, 595, 842]);
        let doc = PdfDocument::load(&data).unwrap();

        assert_eq!(doc.page_count(), 1);
        let page = doc.page(1).unwrap();
        assert_eq!(page.width, 595.0);
        assert_eq!(page.height, 842.0);
        assert!(matches!(doc.page(2), Err(PdfError::InvalidPage(2))));
    }

    #[test]
    fn test_fragment_positions() {
        let data = sample_pdf(
            &[("CATEGORIA", 50.0, 700.0, 10.0), ("CHOFER", 50.0, 680.0, 12.0)],
            [0, 0, 595, 842],
        );
        let page = PdfDocument::load(&data).unwrap().page(1).unwrap();

        assert_eq!(page.fragments.len(), 2);
        assert_eq!(page.fragments[0].text, "CATEGORIA");
        assert!((page.fragments[0].native_x - 50.0).abs() < 1e-3);
        assert!((page.fragments[0].native_y - 700.0).abs() < 1e-3);
        assert_eq!(page.fragments[1].text, "CHOFER");
        assert!((page.fragments[1].approx_height - 14.4).abs() < 1e-3);
    }

    #[test]
    fn test_media_box_origin_is_normalized() {
        let data = sample_pdf(&[("B", 110.0, 220.0, 10.0)], [100, 200, 400, 600]);
        let page = PdfDocument::load(&data).unwrap().page(1).unwrap();

        assert_eq!(page.width, 300.0);
        assert_eq!(page.height, 400.0);
        assert!((page.fragments[0].native_x - 10.0).abs() < 1e-3);
        assert!((page.fragments[0].native_y - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_concat_translation() {
        let scaled = concat(&[1.0, 0.0, 0.0, 1.0, 10.0, 5.0], &[2.0, 0.0, 0.0, 2.0, 1.0, 1.0]);
        assert_eq!(scaled, [2.0, 0.0, 0.0, 2.0, 21.0, 11.0]);
    }
}
