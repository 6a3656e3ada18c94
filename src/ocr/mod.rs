//! Text recognition for image inputs. The engine is a collaborator: the
//! image adapter only relies on [`OcrEngine::recognize`].

mod parse;
mod preprocess;
mod tesseract;

use anyhow::Result;
use serde::Serialize;

use crate::model::BBox;

pub use parse::parse_tsv_lines;
pub use tesseract::{TesseractOcr, list_tesseract_languages};

/// One recognized line. Geometry is in pixels of the original image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrLine {
    pub text: String,
    pub bbox: BBox,
    /// Mean word confidence, 0..=100.
    pub confidence: f32,
    /// Estimated font size in pixels.
    pub font_size: f32,
}

pub trait OcrEngine: Send + Sync {
    /// Returns recognized lines in reading order. Geometry is authoritative.
    fn recognize(&self, image: &[u8]) -> Result<Vec<OcrLine>>;
}
