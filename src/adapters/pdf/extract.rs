//! Groups positioned spans into lines and lines into paragraph-like blocks,
//! each of which becomes one [`TextUnit`].

use tracing::{debug, info, warn};

use super::content::{Interpreter, TextSpan};
use super::{decode_page, load_document, media_box, page_resources};
use crate::data::DocumentFormat;
use crate::error::Result;
use crate::model::{Alignment, BBox, BlobKind, Document, Page, PassthroughBlob, SourceRef, StyleFlags, TextUnit};

/// Spans share a line when their baselines differ by less than this
/// fraction of the font size.
const BASELINE_TOLERANCE: f32 = 0.5;
/// Largest horizontal gap, in font sizes, still bridged within a line.
const MAX_WORD_GAP: f32 = 3.0;
/// Gaps wider than this, in font sizes, become a space.
const SPACE_GAP: f32 = 0.15;
/// Largest baseline distance, in font sizes, between lines of one block.
const MAX_LINE_GAP: f32 = 2.0;
const SIZE_TOLERANCE: f32 = 0.5;
const OVER_IMAGE_RATIO: f32 = 0.5;

#[derive(Debug, Clone)]
struct Line {
    text: String,
    ops: Vec<usize>,
    x0: f32,
    x1: f32,
    baseline: f32,
    size: f32,
    ascent: f32,
    descent: f32,
    font: String,
    bold: bool,
    italic: bool,
}

impl Line {
    fn start(span: &TextSpan) -> Self {
        Self {
            text: span.text.clone(),
            ops: vec![span.op_index],
            x0: span.x0,
            x1: span.x1,
            baseline: span.baseline,
            size: span.size,
            ascent: span.ascent,
            descent: span.descent,
            font: span.font_name.clone(),
            bold: span.bold,
            italic: span.italic,
        }
    }

    fn accepts(&self, span: &TextSpan) -> bool {
        let size = self.size.max(span.size).max(1.0);
        let gap = span.x0 - self.x1;
        (span.baseline - self.baseline).abs() < BASELINE_TOLERANCE * size
            && gap > -BASELINE_TOLERANCE * size
            && gap < MAX_WORD_GAP * size
    }

    fn push(&mut self, span: &TextSpan) {
        let gap = span.x0 - self.x1;
        if gap > SPACE_GAP * self.size && !self.text.ends_with(' ') && !span.text.starts_with(' ') {
            self.text.push(' ');
        }
        self.text.push_str(&span.text);
        self.ops.push(span.op_index);
        self.x0 = self.x0.min(span.x0);
        self.x1 = self.x1.max(span.x1);
        self.ascent = self.ascent.max(span.ascent);
        self.descent = self.descent.max(span.descent);
        self.bold &= span.bold;
        self.italic &= span.italic;
        if span.size > self.size {
            self.size = span.size;
            self.font = span.font_name.clone();
        }
    }
}

pub fn extract_document(bytes: Vec<u8>) -> Result<Document> {
    let pdf = load_document(&bytes)?;
    let mut document = Document::new(DocumentFormat::Pdf, bytes);

    for (index, page_id) in pdf.get_pages().into_values().enumerate() {
        let [left, bottom, right, top] = media_box(&pdf, page_id);
        let mut page = Page::new(index, right - left, top - bottom);

        match decode_page(&pdf, page_id) {
            Ok(content) => {
                let out = Interpreter::new(&pdf, page_resources(&pdf, page_id)).run(&content.operations);
                page.blobs = out
                    .xobjects
                    .iter()
                    .map(|placement| PassthroughBlob {
                        kind: placement.kind,
                        name: placement.name.clone(),
                        bbox: placement.to_page_bbox(left, top),
                    })
                    .collect();
                let lines = group_lines(&out.spans);
                page.units = group_blocks(lines)
                    .iter()
                    .filter_map(|block| block_to_unit(block, left, top, &page.blobs))
                    .collect();
            }
            Err(err) => warn!("page {}: undecodable content stream, left untranslated: {}", index + 1, err),
        }

        debug!(
            "page {}: {} unit(s), {} passthrough object(s)",
            index + 1,
            page.units.len(),
            page.blobs.len()
        );
        document.pages.push(page);
    }

    info!(
        "extracted {} unit(s) from {} PDF page(s)",
        document.unit_count(),
        document.pages.len()
    );
    Ok(document)
}

/// Merges consecutive spans on the same baseline, in content order.
fn group_lines(spans: &[TextSpan]) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    for span in spans {
        match lines.last_mut() {
            Some(line) if line.accepts(span) => line.push(span),
            _ => lines.push(Line::start(span)),
        }
    }
    lines
}

fn group_blocks(lines: Vec<Line>) -> Vec<Vec<Line>> {
    let mut blocks: Vec<Vec<Line>> = Vec::new();
    for line in lines {
        let joins = blocks
            .last()
            .and_then(|block| block.last().map(|last| (block, last)))
            .is_some_and(|(block, last)| continues_block(block, last, &line));
        match blocks.last_mut() {
            Some(block) if joins => block.push(line),
            _ => blocks.push(vec![line]),
        }
    }
    blocks
}

fn continues_block(block: &[Line], last: &Line, line: &Line) -> bool {
    let x0 = block.iter().map(|item| item.x0).fold(f32::MAX, f32::min);
    let x1 = block.iter().map(|item| item.x1).fold(f32::MIN, f32::max);
    let drop = last.baseline - line.baseline;
    (line.size - last.size).abs() < SIZE_TOLERANCE
        && line.bold == last.bold
        && drop > 0.0
        && drop < MAX_LINE_GAP * last.size.max(1.0)
        && line.x0 < x1
        && line.x1 > x0
}

fn block_to_unit(block: &[Line], left: f32, top: f32, blobs: &[PassthroughBlob]) -> Option<TextUnit> {
    let first = block.first()?;
    let text = block
        .iter()
        .map(|line| line.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return None;
    }

    let x0 = block.iter().map(|line| line.x0).fold(f32::MAX, f32::min);
    let x1 = block.iter().map(|line| line.x1).fold(f32::MIN, f32::max);
    let y1 = block
        .iter()
        .map(|line| line.baseline + line.ascent)
        .fold(f32::MIN, f32::max);
    let y0 = block
        .iter()
        .map(|line| line.baseline - line.descent)
        .fold(f32::MAX, f32::min);
    let bbox = BBox::from_corners(x0 - left, top - y1, x1 - left, top - y0);

    let size = (first.size * 10.0).round() / 10.0;
    let bold = block.iter().all(|line| line.bold);
    let mut ops: Vec<usize> = block.iter().flat_map(|line| line.ops.iter().copied()).collect();
    ops.sort_unstable();
    ops.dedup();

    let mut unit = TextUnit::new(text, bbox, SourceRef::Pdf { ops });
    unit.baseline = top - first.baseline;
    unit.alignment = infer_alignment(block);
    unit.font_family = (!first.font.is_empty()).then(|| first.font.clone());
    unit.font_size = size;
    unit.style = StyleFlags {
        bold,
        italic: block.iter().all(|line| line.italic),
    };
    unit.is_heading = size > 14.0 || (bold && size > 12.0);
    unit.over_image = blobs.iter().any(|blob| {
        blob.kind == BlobKind::Image && blob.bbox.intersection_area(&bbox) > OVER_IMAGE_RATIO * bbox.area()
    });
    Some(unit)
}

/// Reads alignment off the line edges. Single lines are left aligned.
fn infer_alignment(block: &[Line]) -> Alignment {
    if block.len() < 2 {
        return Alignment::Left;
    }
    let tolerance = (block[0].size * 0.3).max(2.0);
    let spread = |values: Vec<f32>| {
        let min = values.iter().copied().fold(f32::MAX, f32::min);
        let max = values.iter().copied().fold(f32::MIN, f32::max);
        max - min
    };
    let lefts = spread(block.iter().map(|line| line.x0).collect());
    let rights = spread(block.iter().map(|line| line.x1).collect());
    let centers = spread(block.iter().map(|line| (line.x0 + line.x1) / 2.0).collect());
    let body_rights = spread(block[..block.len() - 1].iter().map(|line| line.x1).collect());

    if lefts < tolerance && block.len() > 2 && body_rights < tolerance && rights >= tolerance {
        Alignment::Justify
    } else if lefts < tolerance {
        Alignment::Left
    } else if rights < tolerance {
        Alignment::Right
    } else if centers < tolerance {
        Alignment::Center
    } else {
        Alignment::Left
    }
}
