use std::collections::BTreeMap;

use super::OcrLine;
use crate::model::BBox;

/// TSV row level for single words.
const WORD_LEVEL: i32 = 5;

struct Word {
    text: String,
    bbox: BBox,
    conf: f32,
}

/// Groups tesseract `tsv` word rows into lines keyed by
/// (page, block, paragraph, line). Words below `min_confidence` are
/// dropped; lines come back in tesseract's reading order. `scale` undoes
/// any upscaling applied before recognition.
pub fn parse_tsv_lines(tsv: &str, min_confidence: f32, scale: f32) -> Vec<OcrLine> {
    let mut grouped: BTreeMap<(i32, i32, i32, i32), Vec<Word>> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let number = |idx: usize| cols[idx].trim().parse::<i32>().unwrap_or(0);
        if number(0) != WORD_LEVEL {
            continue;
        }
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 || conf < min_confidence {
            continue;
        }
        let (left, top, width, height) = (number(6), number(7), number(8), number(9));
        if width <= 0 || height <= 0 {
            continue;
        }
        let factor = scale.max(1.0);
        let bbox = BBox::new(
            left as f32 / factor,
            top as f32 / factor,
            width as f32 / factor,
            height as f32 / factor,
        );
        grouped
            .entry((number(1), number(2), number(3), number(4)))
            .or_default()
            .push(Word {
                text: text.to_string(),
                bbox,
                conf,
            });
    }

    grouped
        .into_values()
        .filter_map(|mut words| {
            words.sort_by(|a, b| a.bbox.x.total_cmp(&b.bbox.x));
            build_line(&words)
        })
        .collect()
}

fn build_line(words: &[Word]) -> Option<OcrLine> {
    let first = words.first()?;
    let mut text = String::new();
    let mut bbox = first.bbox;
    let mut conf_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut heights = Vec::with_capacity(words.len());
    for word in words {
        if !text.is_empty() && needs_space(&text, &word.text) {
            text.push(' ');
        }
        text.push_str(&word.text);
        bbox = bbox.union(&word.bbox);
        let weight = word.text.chars().count().max(1) as f32;
        conf_sum += word.conf * weight;
        weight_sum += weight;
        heights.push(word.bbox.height);
    }
    heights.sort_by(f32::total_cmp);
    let median = heights[heights.len() / 2].max(1.0);

    Some(OcrLine {
        text,
        bbox,
        confidence: conf_sum / weight_sum.max(1.0),
        font_size: (median * 0.9).clamp(8.0, 96.0),
    })
}

/// Scripts written without spaces (CJK, kana) join words directly.
fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => !(is_unspaced(a) && is_unspaced(b)),
        _ => false,
    }
}

fn is_unspaced(ch: char) -> bool {
    matches!(
        ch as u32,
        0x3040..=0x30FF | 0x31F0..=0x31FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xFF00..=0xFFEF
    )
}
