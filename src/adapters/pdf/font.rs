//! Decoding of text-showing strings through the fonts of the source PDF.

use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;

use super::cmap::ToUnicode;
use super::{resolve, stream_bytes};
use crate::fonts::builtin;

/// One decoded character code.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedGlyph {
    pub text: String,
    /// Advance in text space units (1/1000 em).
    pub width: f32,
    /// Single-byte code 32, which also receives word spacing.
    pub is_space: bool,
}

#[derive(Debug, Clone)]
pub struct PdfFont {
    pub base_font: String,
    pub bold: bool,
    pub italic: bool,
    pub ascent: f32,
    pub descent: f32,
    composite: bool,
    to_unicode: Option<ToUnicode>,
    widths: HashMap<u32, f32>,
    default_width: f32,
    has_widths: bool,
}

impl PdfFont {
    pub fn load(doc: &Document, dict: &Dictionary) -> Self {
        let base_font = dict
            .get(b"BaseFont")
            .ok()
            .and_then(|obj| obj.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .unwrap_or_default();
        let base_font = strip_subset_prefix(&base_font).to_string();
        let composite = dict
            .get(b"Subtype")
            .ok()
            .and_then(|obj| obj.as_name().ok())
            .is_some_and(|name| name == b"Type0");

        let to_unicode = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_stream().ok())
            .map(|stream| ToUnicode::parse(&stream_bytes(stream)));

        let descendant = if composite {
            dict.get(b"DescendantFonts")
                .ok()
                .and_then(|obj| resolve(doc, obj))
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| array.first())
                .and_then(|obj| resolve(doc, obj))
                .and_then(|obj| obj.as_dict().ok())
        } else {
            None
        };

        let mut widths = HashMap::new();
        let mut has_widths = false;
        let mut default_width = if composite { 1000.0 } else { 0.0 };
        if let Some(descendant) = descendant {
            if let Some(dw) = descendant.get(b"DW").ok().and_then(|obj| obj.as_float().ok()) {
                default_width = dw;
            }
            if let Some(array) = descendant
                .get(b"W")
                .ok()
                .and_then(|obj| resolve(doc, obj))
                .and_then(|obj| obj.as_array().ok())
            {
                parse_cid_widths(doc, array, &mut widths);
                has_widths = true;
            }
        } else if let Some(array) = dict
            .get(b"Widths")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_array().ok())
        {
            let first = dict
                .get(b"FirstChar")
                .ok()
                .and_then(|obj| obj.as_i64().ok())
                .unwrap_or(0)
                .max(0) as u32;
            for (offset, value) in array.iter().enumerate() {
                if let Some(width) = resolve(doc, value).and_then(|obj| obj.as_float().ok()) {
                    widths.insert(first + offset as u32, width);
                }
            }
            has_widths = true;
        }

        let descriptor = descendant
            .unwrap_or(dict)
            .get(b"FontDescriptor")
            .ok()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok());
        let number = |key: &[u8]| {
            descriptor
                .and_then(|descriptor| descriptor.get(key).ok())
                .and_then(|obj| obj.as_float().ok())
        };
        if !composite && let Some(missing) = number(b"MissingWidth") {
            default_width = missing;
        }
        let flags = number(b"Flags").unwrap_or(0.0) as u32;
        let weight = number(b"FontWeight").unwrap_or(0.0);
        let italic_angle = number(b"ItalicAngle").unwrap_or(0.0);
        let lower = base_font.to_ascii_lowercase();

        Self {
            bold: lower.contains("bold")
                || lower.contains("black")
                || lower.contains("heavy")
                || weight >= 600.0
                || flags & (1 << 18) != 0,
            italic: lower.contains("italic") || lower.contains("oblique") || italic_angle.abs() > 0.5 || flags & (1 << 6) != 0,
            ascent: number(b"Ascent").filter(|value| *value > 0.0).unwrap_or(builtin::ASCENT as f32),
            descent: number(b"Descent")
                .filter(|value| *value < 0.0)
                .unwrap_or(builtin::DESCENT as f32),
            base_font,
            composite,
            to_unicode,
            widths,
            default_width,
            has_widths,
        }
    }

    /// Placeholder for a font name that is not in the resources.
    pub fn unknown() -> Self {
        Self {
            base_font: String::new(),
            bold: false,
            italic: false,
            ascent: builtin::ASCENT as f32,
            descent: builtin::DESCENT as f32,
            composite: false,
            to_unicode: None,
            widths: HashMap::new(),
            default_width: 0.0,
            has_widths: false,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Vec<DecodedGlyph> {
        let mut glyphs = Vec::new();
        let mut index = 0;
        let default_len = if self.composite { 2 } else { 1 };
        while index < bytes.len() {
            let len = match &self.to_unicode {
                Some(cmap) if cmap.has_codespaces() && self.composite => cmap.code_len(&bytes[index..], default_len),
                _ => default_len,
            }
            .min(bytes.len() - index)
            .max(1);
            let code = bytes[index..index + len]
                .iter()
                .fold(0u32, |acc, byte| (acc << 8) | *byte as u32);
            index += len;

            let text = self.text_for(code);
            glyphs.push(DecodedGlyph {
                width: self.width_for(code, &text),
                is_space: len == 1 && code == 32,
                text,
            });
        }
        glyphs
    }

    fn text_for(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|cmap| cmap.lookup(code)) {
            return text.to_string();
        }
        if self.composite {
            return char::from_u32(code)
                .filter(|ch| !ch.is_control())
                .map(String::from)
                .unwrap_or_default();
        }
        let ch = builtin::win_ansi_decode(code as u8);
        if ch.is_control() { String::new() } else { ch.to_string() }
    }

    fn width_for(&self, code: u32, text: &str) -> f32 {
        if let Some(width) = self.widths.get(&code) {
            return *width;
        }
        if self.has_widths || self.composite {
            return self.default_width;
        }
        let ch = text.chars().next().unwrap_or(' ');
        builtin::standard_font_width(&self.base_font, ch) as f32
    }
}

/// `W` arrays mix `c [w1 w2 ...]` and `c_first c_last w` entries.
fn parse_cid_widths(doc: &Document, array: &[Object], widths: &mut HashMap<u32, f32>) {
    let mut index = 0;
    while index < array.len() {
        let Some(first) = resolve(doc, &array[index]).and_then(|obj| obj.as_i64().ok()) else {
            break;
        };
        let Some(next) = array.get(index + 1).and_then(|obj| resolve(doc, obj)) else {
            break;
        };
        if let Ok(list) = next.as_array() {
            for (offset, value) in list.iter().enumerate() {
                if let Some(width) = resolve(doc, value).and_then(|obj| obj.as_float().ok()) {
                    widths.insert(first as u32 + offset as u32, width);
                }
            }
            index += 2;
        } else {
            let last = next.as_i64().unwrap_or(first);
            let width = array
                .get(index + 2)
                .and_then(|obj| resolve(doc, obj))
                .and_then(|obj| obj.as_float().ok())
                .unwrap_or(1000.0);
            if last >= first && last - first <= 0xFFFF {
                for code in first..=last {
                    widths.insert(code as u32, width);
                }
            }
            index += 3;
        }
    }
}

/// `ABCDEF+Family` names a subset of `Family`.
pub fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((prefix, rest)) if prefix.len() == 6 && prefix.bytes().all(|b| b.is_ascii_uppercase()) => rest,
        _ => name,
    }
}
