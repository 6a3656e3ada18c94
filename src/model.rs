//! Format-independent document model shared by every adapter.
//!
//! Coordinates are page units with a top-left origin: `x` grows to the right
//! and `y` grows downwards. PDF points are flipped on extraction, DOCX
//! geometry is synthesized from the section's page size and margins, and
//! image geometry is in pixels.

use serde::Serialize;
use std::sync::Arc;

use crate::data::DocumentFormat;
use crate::fit::{FitQuality, FitResult};
use crate::fonts::FontAsset;

/// Boxes thinner than this in either direction are treated as degenerate.
pub const MIN_EXTENT: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let left = x0.min(x1);
        let top = y0.min(y1);
        Self::new(left, top, (x1 - x0).abs(), (y1 - y0).abs())
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.width >= MIN_EXTENT && self.height >= MIN_EXTENT)
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        if w <= 0.0 || h <= 0.0 { 0.0 } else { w * h }
    }

    /// Intersects the box with the page rectangle `0,0,width,height`.
    pub fn clamp_to(&self, width: f32, height: f32) -> BBox {
        let x0 = self.x.clamp(0.0, width);
        let y0 = self.y.clamp(0.0, height);
        let x1 = self.right().clamp(0.0, width);
        let y1 = self.bottom().clamp(0.0, height);
        BBox::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }

    pub fn contains(&self, other: &BBox, tolerance: f32) -> bool {
        other.x >= self.x - tolerance
            && other.y >= self.y - tolerance
            && other.right() <= self.right() + tolerance
            && other.bottom() <= self.bottom() + tolerance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    /// Rendered as `Left`: no justification is performed.
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StyleFlags {
    pub bold: bool,
    pub italic: bool,
}

/// Where a unit came from inside its container, so the adapter can replace it.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRef {
    /// Indices of the text-showing operations in the page's decoded content.
    Pdf { ops: Vec<usize> },
    /// Paragraph ordinal (pre-order over every `w:p`) inside a package part.
    Docx { part: String, paragraph: usize },
    /// Line index reported by the OCR collaborator.
    Ocr { line: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobKind {
    Image,
    Form,
    Drawing,
}

/// Non-text content carried through reconstruction untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassthroughBlob {
    pub kind: BlobKind,
    pub name: String,
    pub bbox: BBox,
}

/// Per-unit fidelity loss. Never an error: the document is still produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    PartialGlyphCoverage { font: String, missing: String },
    OverflowedTruncated { font_size: f32 },
    OverflowedClipped { font_size: f32 },
    TranslationFailed { reason: String },
    SkippedDegenerateBox { width: f32, height: f32 },
    FontFallback { requested: String, used: String },
}

/// The font and fit chosen for a translated unit.
#[derive(Debug, Clone)]
pub struct Placement {
    pub font: Arc<FontAsset>,
    pub fit: FitResult,
}

#[derive(Debug, Clone)]
pub struct TextUnit {
    pub source: String,
    pub bbox: BBox,
    /// First baseline, in page coordinates.
    pub baseline: f32,
    pub alignment: Alignment,
    pub font_family: Option<String>,
    pub font_size: f32,
    pub style: StyleFlags,
    pub language: Option<String>,
    pub is_heading: bool,
    /// Mostly covered by an image placement (PDF only).
    pub over_image: bool,
    pub source_ref: SourceRef,
    translation: Option<String>,
    placement: Option<Placement>,
    pub degradations: Vec<Degradation>,
}

impl TextUnit {
    pub fn new(source: impl Into<String>, bbox: BBox, source_ref: SourceRef) -> Self {
        Self {
            source: source.into(),
            baseline: bbox.bottom(),
            bbox,
            alignment: Alignment::Left,
            font_family: None,
            font_size: 0.0,
            style: StyleFlags::default(),
            language: None,
            is_heading: false,
            over_image: false,
            source_ref,
            translation: None,
            placement: None,
            degradations: Vec::new(),
        }
    }

    pub fn translation(&self) -> Option<&str> {
        self.translation.as_deref()
    }

    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    /// Attaches the translated string. A unit is translated at most once;
    /// later calls are ignored.
    pub fn set_translation(&mut self, text: String) {
        if self.translation.is_none() {
            self.translation = Some(text);
        }
    }

    pub(crate) fn set_placement(&mut self, placement: Placement) {
        if self.placement.is_none() {
            self.placement = Some(placement);
        }
    }

    pub fn degrade(&mut self, degradation: Degradation) {
        self.degradations.push(degradation);
    }

    pub fn translation_failed(&self) -> bool {
        self.degradations
            .iter()
            .any(|item| matches!(item, Degradation::TranslationFailed { .. }))
    }

    /// Translated text that should replace the source, if any.
    pub fn replacement(&self) -> Option<&str> {
        self.translation
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }

    pub fn fit_quality(&self) -> Option<FitQuality> {
        self.placement.as_ref().map(|placement| placement.fit.quality)
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub units: Vec<TextUnit>,
    pub blobs: Vec<PassthroughBlob>,
}

impl Page {
    pub fn new(index: usize, width: f32, height: f32) -> Self {
        Self {
            index,
            width,
            height,
            units: Vec::new(),
            blobs: Vec::new(),
        }
    }

    pub fn bounds(&self) -> BBox {
        BBox::new(0.0, 0.0, self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub format: DocumentFormat,
    pub pages: Vec<Page>,
    /// The untouched input; adapters re-read it when rendering.
    pub original: Arc<Vec<u8>>,
    pub notes: Vec<String>,
}

impl Document {
    pub fn new(format: DocumentFormat, original: Vec<u8>) -> Self {
        Self {
            format,
            pages: Vec::new(),
            original: Arc::new(original),
            notes: Vec::new(),
        }
    }

    pub fn unit_count(&self) -> usize {
        self.pages.iter().map(|page| page.units.len()).sum()
    }

    pub fn units(&self) -> impl Iterator<Item = &TextUnit> {
        self.pages.iter().flat_map(|page| page.units.iter())
    }

    pub fn units_mut(&mut self) -> impl Iterator<Item = &mut TextUnit> {
        self.pages.iter_mut().flat_map(|page| page.units.iter_mut())
    }
}

/// Removes `**` bold markers; used wherever inline bold cannot be expressed.
pub fn strip_bold_markers(text: &str) -> String {
    text.replace("**", "")
}

/// Splits `**`-marked text into `(segment, bold)` runs. Empty segments are dropped.
pub fn split_bold_markers(text: &str) -> Vec<(String, bool)> {
    text.split("**")
        .enumerate()
        .filter(|(_, part)| !part.is_empty())
        .map(|(idx, part)| (part.to_string(), idx % 2 == 1))
        .collect()
}
