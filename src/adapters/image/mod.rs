//! Raster images: OCR supplies positioned lines, and reconstruction paints
//! the translation over each line's region before re-encoding in the input
//! format.

mod render;

use std::sync::Arc;
use tracing::{info, warn};

use super::{DocumentAdapter, RenderContext};
use crate::data::{DocumentFormat, ImageKind};
use crate::error::{EngineError, Result};
use crate::model::{Document, Page, SourceRef, TextUnit};
use crate::ocr::OcrEngine;

pub struct ImageAdapter {
    kind: ImageKind,
    ocr: Arc<dyn OcrEngine>,
}

impl ImageAdapter {
    pub fn new(kind: ImageKind, ocr: Arc<dyn OcrEngine>) -> Self {
        Self { kind, ocr }
    }
}

pub(crate) fn image_format(kind: ImageKind) -> image::ImageFormat {
    match kind {
        ImageKind::Png => image::ImageFormat::Png,
        ImageKind::Jpeg => image::ImageFormat::Jpeg,
    }
}

impl DocumentAdapter for ImageAdapter {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Image(self.kind)
    }

    fn extract(&self, bytes: Vec<u8>) -> Result<Document> {
        let format = self.format();
        let detected = image::guess_format(&bytes)
            .map_err(|err| EngineError::corrupt(format, format!("not an image: {}", err)))?;
        if detected != image_format(self.kind) {
            return Err(EngineError::corrupt(
                format,
                format!("bytes are {:?}, not {}", detected, format),
            ));
        }
        let decoded = image::load_from_memory_with_format(&bytes, detected)
            .map_err(|err| EngineError::corrupt(format, format!("failed to decode image: {}", err)))?;
        let (width, height) = (decoded.width() as f32, decoded.height() as f32);

        let mut page = Page::new(0, width, height);
        let mut document = Document::new(format, Vec::new());
        match self.ocr.recognize(&bytes) {
            Ok(lines) => {
                for (index, line) in lines.into_iter().enumerate() {
                    if line.text.trim().is_empty() {
                        continue;
                    }
                    let bbox = line.bbox.clamp_to(width, height);
                    let mut unit = TextUnit::new(line.text, bbox, SourceRef::Ocr { line: index });
                    unit.font_size = line.font_size;
                    page.units.push(unit);
                }
            }
            Err(err) => {
                warn!("OCR failed: {:#}", err);
                document.notes.push(format!("OCR failed: {:#}", err));
            }
        }
        info!(
            "recognized {} line(s) on a {}x{} image",
            page.units.len(),
            width,
            height
        );
        document.pages.push(page);
        document.original = Arc::new(bytes);
        Ok(document)
    }

    fn render(&self, document: &Document, context: &RenderContext<'_>) -> Result<Vec<u8>> {
        render::render_overlay(document, self.kind, context)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use anyhow::{Result, anyhow};
    use std::io::Cursor;

    use crate::model::BBox;
    use crate::ocr::{OcrEngine, OcrLine};

    /// Returns the same lines for every image, or fails when given none.
    pub struct ScriptedOcr(pub Option<Vec<OcrLine>>);

    impl OcrEngine for ScriptedOcr {
        fn recognize(&self, _image: &[u8]) -> Result<Vec<OcrLine>> {
            self.0.clone().ok_or_else(|| anyhow!("tesseract not installed"))
        }
    }

    pub fn line(text: &str, bbox: BBox) -> OcrLine {
        OcrLine {
            text: text.to_string(),
            bbox,
            confidence: 90.0,
            font_size: 12.0,
        }
    }

    pub fn solid_image(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
        let image = image::RgbImage::from_pixel(width, height, image::Rgb([200, 0, 0]));
        let mut out = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut out), format)
            .unwrap();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{ScriptedOcr, line, solid_image};
    use super::*;
    use crate::model::BBox;

    fn adapter(kind: ImageKind, lines: Option<Vec<crate::ocr::OcrLine>>) -> ImageAdapter {
        ImageAdapter::new(kind, Arc::new(ScriptedOcr(lines)))
    }

    #[test]
    fn ocr_lines_become_units_clamped_to_the_image() {
        let bytes = solid_image(200, 100, image::ImageFormat::Png);
        let lines = vec![
            line("Hello", BBox::new(10.0, 10.0, 80.0, 20.0)),
            line("   ", BBox::new(10.0, 40.0, 80.0, 20.0)),
            line("Edge", BBox::new(180.0, 80.0, 50.0, 30.0)),
        ];
        let document = adapter(ImageKind::Png, Some(lines)).extract(bytes).unwrap();
        let page = &document.pages[0];
        assert_eq!((page.width, page.height), (200.0, 100.0));
        assert_eq!(page.units.len(), 2);
        assert_eq!(page.units[1].bbox, BBox::new(180.0, 80.0, 20.0, 20.0));
        assert_eq!(page.units[1].source_ref, SourceRef::Ocr { line: 2 });
        assert_eq!(page.units[0].font_size, 12.0);
    }

    #[test]
    fn mismatched_bytes_are_rejected() {
        let png = solid_image(10, 10, image::ImageFormat::Png);
        let err = adapter(ImageKind::Jpeg, Some(Vec::new())).extract(png).unwrap_err();
        assert!(err.is_input_error());

        let err = adapter(ImageKind::Png, Some(Vec::new()))
            .extract(b"%PDF-1.7".to_vec())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOrCorruptInput { .. }));
    }

    #[test]
    fn ocr_failure_leaves_an_empty_page_with_a_note() {
        let bytes = solid_image(20, 20, image::ImageFormat::Jpeg);
        let document = adapter(ImageKind::Jpeg, None).extract(bytes).unwrap();
        assert_eq!(document.unit_count(), 0);
        assert_eq!(document.pages.len(), 1);
        assert!(document.notes[0].contains("tesseract not installed"));
    }
}
