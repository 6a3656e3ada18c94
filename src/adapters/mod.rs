//! Format adapters: each reads raw bytes into a [`Document`] and writes a
//! translated document back into the same container format.

pub mod docx;
pub mod image;
pub mod pdf;

use std::sync::Arc;

use crate::data::DocumentFormat;
use crate::error::Result;
use crate::fonts::FontResolver;
use crate::layout::layout_document;
use crate::model::Document;
use crate::ocr::OcrEngine;
use crate::scripts::ScriptProfile;
use crate::settings::Settings;

/// Everything an adapter needs to lay out and render translated units.
pub struct RenderContext<'a> {
    pub settings: &'a Settings,
    pub profile: &'a ScriptProfile,
    pub resolver: &'a FontResolver,
}

pub trait DocumentAdapter: Send + Sync {
    fn format(&self) -> DocumentFormat;

    /// Parses `bytes` into positioned text units. Fails with
    /// `UnsupportedOrCorruptInput` when the bytes are not this format.
    fn extract(&self, bytes: Vec<u8>) -> Result<Document>;

    /// Serializes a document whose units already carry placements.
    fn render(&self, document: &Document, context: &RenderContext<'_>) -> Result<Vec<u8>>;

    /// Resolves fonts and fits every translated unit, then renders.
    fn reconstruct(&self, document: &mut Document, context: &RenderContext<'_>) -> Result<Vec<u8>> {
        layout_document(
            document,
            context.profile,
            context.resolver,
            &context.settings.fit,
            context.settings.worker_count(),
        )?;
        self.render(document, context)
    }
}

pub fn adapter_for(format: DocumentFormat, ocr: Arc<dyn OcrEngine>) -> Box<dyn DocumentAdapter> {
    match format {
        DocumentFormat::Pdf => Box::new(pdf::PdfAdapter),
        DocumentFormat::Docx => Box::new(docx::DocxAdapter),
        DocumentFormat::Image(kind) => Box::new(image::ImageAdapter::new(kind, ocr)),
    }
}

/// Parses `#rrggbb` (or `rrggbb`) into 0..=1 components; black on error.
pub(crate) fn parse_hex_color(value: &str) -> [f32; 3] {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return [0.0, 0.0, 0.0];
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map(|value| value as f32 / 255.0)
            .unwrap_or(0.0)
    };
    [channel(0..2), channel(2..4), channel(4..6)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_with_or_without_hash() {
        assert_eq!(parse_hex_color("#ffffff"), [1.0, 1.0, 1.0]);
        assert_eq!(parse_hex_color("000000"), [0.0, 0.0, 0.0]);
        assert_eq!(parse_hex_color("nonsense"), [0.0, 0.0, 0.0]);
    }
}
