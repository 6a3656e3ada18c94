//! PDF adapter built on `lopdf`: text is read from the page content streams
//! and replaced in place, so vector graphics, images and annotations are
//! carried over untouched.

mod cmap;
mod content;
mod embed;
mod extract;
mod font;
mod render;

use lopdf::content::Content;
use lopdf::{Dictionary, Document as PdfDocument, Object, ObjectId, Stream};

use super::{DocumentAdapter, RenderContext};
use crate::data::DocumentFormat;
use crate::error::{EngineError, Result};
use crate::model::Document;

pub use content::Matrix;

/// US Letter, used when no `MediaBox` is found anywhere up the page tree.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Guard against cyclic `Parent` chains.
const MAX_TREE_DEPTH: usize = 32;

/// The header may be preceded by junk, but only within the first kilobyte.
const HEADER_WINDOW: usize = 1024;

pub struct PdfAdapter;

impl DocumentAdapter for PdfAdapter {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn extract(&self, bytes: Vec<u8>) -> Result<Document> {
        extract::extract_document(bytes)
    }

    fn render(&self, document: &Document, context: &RenderContext<'_>) -> Result<Vec<u8>> {
        render::render_document(document, context)
    }
}

/// Parses `bytes`, rejecting anything that is not an unencrypted PDF with at
/// least one page.
pub(crate) fn load_document(bytes: &[u8]) -> Result<PdfDocument> {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    if !window.windows(5).any(|chunk| chunk == b"%PDF-") {
        return Err(EngineError::corrupt(DocumentFormat::Pdf, "missing %PDF header"));
    }
    let doc = PdfDocument::load_mem(bytes)
        .map_err(|err| EngineError::corrupt(DocumentFormat::Pdf, err.to_string()))?;
    if doc.is_encrypted() {
        return Err(EngineError::corrupt(DocumentFormat::Pdf, "encrypted documents are not supported"));
    }
    if doc.get_pages().is_empty() {
        return Err(EngineError::corrupt(DocumentFormat::Pdf, "document has no pages"));
    }
    Ok(doc)
}

/// Follows one level of indirection.
pub(crate) fn resolve<'a>(doc: &'a PdfDocument, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Stream data with filters applied; unfiltered streams are returned as is.
pub(crate) fn stream_bytes(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// Looks `key` up on the page, then on its ancestors in the page tree.
fn inherited<'a>(doc: &'a PdfDocument, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

pub(crate) fn page_resources(doc: &PdfDocument, page_id: ObjectId) -> Option<&Dictionary> {
    inherited(doc, page_id, b"Resources").and_then(|obj| obj.as_dict().ok())
}

/// `[x0, y0, x1, y1]` with `x0 < x1` and `y0 < y1`.
pub(crate) fn media_box(doc: &PdfDocument, page_id: ObjectId) -> [f32; 4] {
    let values: Vec<f32> = inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .map(|array| {
            array
                .iter()
                .filter_map(|item| resolve(doc, item).and_then(|obj| obj.as_float().ok()))
                .collect()
        })
        .unwrap_or_default();
    if values.len() != 4 {
        return DEFAULT_MEDIA_BOX;
    }
    let [x0, y0, x1, y1] = [values[0], values[1], values[2], values[3]];
    if (x1 - x0).abs() < 1.0 || (y1 - y0).abs() < 1.0 {
        return DEFAULT_MEDIA_BOX;
    }
    [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]
}

/// Decodes the concatenation of every content stream of a page.
pub(crate) fn decode_page(doc: &PdfDocument, page_id: ObjectId) -> lopdf::Result<Content> {
    let mut data = Vec::new();
    for id in doc.get_page_contents(page_id) {
        if let Ok(stream) = doc.get_object(id).and_then(|obj| obj.as_stream()) {
            if !data.is_empty() {
                data.push(b'\n');
            }
            data.extend_from_slice(&stream_bytes(stream));
        }
    }
    Content::decode(&data)
}


#[cfg(test)]
mod tests {
    use super::test_support::build_pdf;
    use super::*;

    #[test]
    fn rejects_bytes_without_pdf_header() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
        let err = load_document(&jpeg).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOrCorruptInput { format: DocumentFormat::Pdf, .. }));
    }

    #[test]
    fn rejects_header_followed_by_garbage() {
        let err = load_document(b"%PDF-1.7\nthis is not a pdf body\n").unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn media_box_is_inherited_from_the_page_tree() {
        let doc = load_document(&build_pdf(b"BT ET")).unwrap();
        let page_id = *doc.get_pages().get(&1).unwrap();
        assert_eq!(media_box(&doc, page_id), [0.0, 0.0, 612.0, 792.0]);
        assert!(page_resources(&doc, page_id).is_some());
        assert_eq!(decode_page(&doc, page_id).unwrap().operations.len(), 2);
    }
}
