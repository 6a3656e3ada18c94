//! Rewrites page content: the source text of replaced units is removed and
//! the fitted translation is drawn in its box with an embedded font.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use unicode_bidi::BidiInfo;

use super::content::Interpreter;
use super::embed::FontEmbedder;
use super::{decode_page, load_document, media_box, page_resources, resolve};
use crate::adapters::{RenderContext, parse_hex_color};
use crate::error::Result;
use crate::fit::FitQuality;
use crate::layout::is_renderable;
use crate::model::{Alignment, Document, SourceRef, TextUnit};

struct DrawStyle {
    text: [f32; 3],
    fill: [f32; 3],
    background: bool,
    rtl: bool,
}

pub fn render_document(document: &Document, context: &RenderContext<'_>) -> Result<Vec<u8>> {
    let mut pdf = load_document(&document.original)?;
    let pages = pdf.get_pages();
    let style = DrawStyle {
        text: parse_hex_color(&context.settings.render.text_color),
        fill: parse_hex_color(&context.settings.render.fill_color),
        background: context.settings.render.pdf_background,
        rtl: context.profile.rtl,
    };
    let mut embedder = FontEmbedder::default();
    let mut rewritten = 0;

    for page in &document.pages {
        let units: Vec<&TextUnit> = page.units.iter().filter(|unit| is_renderable(unit)).collect();
        if units.is_empty() {
            continue;
        }
        let Some(page_id) = pages.get(&(page.index as u32 + 1)).copied() else {
            warn!("page {} is missing from the source document", page.index + 1);
            continue;
        };
        let content = match decode_page(&pdf, page_id) {
            Ok(content) => content,
            Err(err) => {
                warn!("page {}: content could not be decoded again: {}", page.index + 1, err);
                continue;
            }
        };

        let adjustments: HashMap<usize, f32> = Interpreter::new(&pdf, page_resources(&pdf, page_id))
            .run(&content.operations)
            .spans
            .iter()
            .map(|span| (span.op_index, span.adjustment))
            .collect();
        let removed: HashMap<usize, f32> = units
            .iter()
            .filter_map(|unit| match &unit.source_ref {
                SourceRef::Pdf { ops } => Some(ops.iter().copied()),
                _ => None,
            })
            .flatten()
            .map(|index| (index, adjustments.get(&index).copied().unwrap_or(0.0)))
            .collect();
        let mut operations = vec![Operation::new("q", vec![])];
        operations.extend(remove_operations(content.operations, &removed));
        operations.push(Operation::new("Q", vec![]));

        let [left, _, _, top] = media_box(&pdf, page_id);
        let mut page_fonts = Vec::new();
        for unit in units {
            let Some(placement) = unit.placement() else {
                continue;
            };
            let (resource, font_id) = embedder.register(&mut pdf, &placement.font);
            page_fonts.push((resource.clone(), font_id));
            draw_unit(&mut operations, unit, &resource, &mut embedder, left, top, &style);
        }

        let data = Content { operations }.encode()?;
        let mut stream = lopdf::Stream::new(Dictionary::new(), data);
        let _ = stream.compress();
        let content_id = pdf.add_object(stream);

        let mut resources = page_resources(&pdf, page_id).cloned().unwrap_or_default();
        let mut fonts = resources
            .get(b"Font")
            .ok()
            .and_then(|obj| resolve(&pdf, obj))
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_default();
        for (name, id) in page_fonts {
            fonts.set(name, id);
        }
        resources.set("Font", Object::Dictionary(fonts));

        let page_dict = pdf.get_object_mut(page_id).and_then(|obj| obj.as_dict_mut())?;
        page_dict.set("Resources", Object::Dictionary(resources));
        page_dict.set("Contents", content_id);
        rewritten += 1;
        debug!("page {} rewritten", page.index + 1);
    }

    embedder.finish(&mut pdf);
    let mut out = Vec::new();
    pdf.save_to(&mut out)?;
    info!("rendered PDF: {} page(s) rewritten, {} bytes", rewritten, out.len());
    Ok(out)
}

/// Drops the listed text-showing operations. Each leaves behind a glyphless
/// `TJ` with the same advance, and `'` or `"` keep their line move and
/// spacing, so later text in the same text object does not shift.
fn remove_operations(operations: Vec<Operation>, removed: &HashMap<usize, f32>) -> Vec<Operation> {
    let mut out = Vec::with_capacity(operations.len());
    for (index, op) in operations.into_iter().enumerate() {
        let Some(adjustment) = removed.get(&index).copied() else {
            out.push(op);
            continue;
        };
        match op.operator.as_str() {
            "Tj" | "TJ" => {}
            "'" => out.push(Operation::new("T*", vec![])),
            "\"" => {
                let mut operands = op.operands.into_iter();
                if let Some(word_spacing) = operands.next() {
                    out.push(Operation::new("Tw", vec![word_spacing]));
                }
                if let Some(char_spacing) = operands.next() {
                    out.push(Operation::new("Tc", vec![char_spacing]));
                }
                out.push(Operation::new("T*", vec![]));
            }
            _ => {
                out.push(op);
                continue;
            }
        }
        if adjustment != 0.0 {
            out.push(Operation::new("TJ", vec![Object::Array(vec![Object::Real(adjustment)])]));
        }
    }
    out
}

fn draw_unit(
    operations: &mut Vec<Operation>,
    unit: &TextUnit,
    resource: &str,
    embedder: &mut FontEmbedder,
    left: f32,
    top: f32,
    style: &DrawStyle,
) {
    let Some(placement) = unit.placement() else {
        return;
    };
    let fit = &placement.fit;
    let bbox = unit.bbox;
    let x = left + bbox.x;
    let y = top - bbox.bottom();

    operations.push(Operation::new("q", vec![]));
    if style.background && !unit.over_image {
        operations.push(color_op("rg", style.fill));
        operations.push(rect_op(x, y, bbox.width, bbox.height));
        operations.push(Operation::new("f", vec![]));
    }
    if fit.quality == FitQuality::OverflowedClipped {
        operations.push(rect_op(x, y, bbox.width, bbox.height));
        operations.push(Operation::new("W", vec![]));
        operations.push(Operation::new("n", vec![]));
    }

    operations.push(Operation::new("BT", vec![]));
    operations.push(Operation::new(
        "Tf",
        vec![Object::Name(resource.as_bytes().to_vec()), Object::Real(fit.font_size)],
    ));
    operations.push(color_op("rg", style.text));

    let ascent = placement.font.ascent(fit.font_size);
    for (index, line) in fit.lines.iter().enumerate() {
        if line.text.trim().is_empty() {
            continue;
        }
        let offset = match unit.alignment {
            Alignment::Center => (bbox.width - line.width) / 2.0,
            Alignment::Right => bbox.width - line.width,
            Alignment::Left | Alignment::Justify => 0.0,
        }
        .max(0.0);
        let baseline = bbox.y + ascent + index as f32 * fit.line_height;
        let text = if style.rtl { visual_order(&line.text) } else { line.text.clone() };
        operations.push(Operation::new(
            "Tm",
            [1.0, 0.0, 0.0, 1.0, x + offset, top - baseline]
                .into_iter()
                .map(Object::Real)
                .collect(),
        ));
        operations.push(Operation::new("Tj", vec![embedder.encode(resource, &text)]));
    }
    operations.push(Operation::new("ET", vec![]));
    operations.push(Operation::new("Q", vec![]));
}

/// Reorders a logical-order line for left-to-right glyph placement.
fn visual_order(text: &str) -> String {
    let info = BidiInfo::new(text, None);
    if !info.has_rtl() {
        return text.to_string();
    }
    info.paragraphs
        .iter()
        .map(|paragraph| info.reorder_line(paragraph, paragraph.range.clone()).into_owned())
        .collect()
}

fn color_op(operator: &str, [r, g, b]: [f32; 3]) -> Operation {
    Operation::new(operator, vec![Object::Real(r), Object::Real(g), Object::Real(b)])
}

fn rect_op(x: f32, y: f32, width: f32, height: f32) -> Operation {
    Operation::new(
        "re",
        vec![Object::Real(x), Object::Real(y), Object::Real(width), Object::Real(height)],
    )
}
