//! Font assets: parsed metrics, glyph coverage and the resolver that picks a
//! font for a script profile.

pub mod builtin;
mod cache;
mod resolver;
pub mod sfnt;

pub use cache::FontCache;
pub use resolver::{FontResolver, ResolvedFont};

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use ttf_parser::Face;
use ttf_parser::name_id;

use crate::model::StyleFlags;

/// Family name of the always-available default font.
pub const BUILTIN_FAMILY: &str = "Helvetica";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontStyle {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub fn from_flags(flags: StyleFlags) -> Self {
        match (flags.bold, flags.italic) {
            (true, true) => FontStyle::BoldItalic,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (false, false) => FontStyle::Regular,
        }
    }

    /// File name suffix, as in `NotoSans-BoldItalic.ttf`.
    pub fn suffix(self) -> &'static str {
        match self {
            FontStyle::Regular => "Regular",
            FontStyle::Bold => "Bold",
            FontStyle::Italic => "Italic",
            FontStyle::BoldItalic => "BoldItalic",
        }
    }

    pub fn is_bold(self) -> bool {
        matches!(self, FontStyle::Bold | FontStyle::BoldItalic)
    }

    pub fn is_italic(self) -> bool {
        matches!(self, FontStyle::Italic | FontStyle::BoldItalic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontOrigin {
    File(PathBuf),
    System(String),
    Builtin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphInfo {
    pub id: u16,
    /// Horizontal advance in font units.
    pub advance: u16,
}

/// A loaded font. Immutable once built and shared through `Arc`.
pub struct FontAsset {
    pub family: String,
    pub postscript_name: String,
    pub style: FontStyle,
    pub origin: FontOrigin,
    data: Option<Arc<Vec<u8>>>,
    face_index: u32,
    pub units_per_em: u16,
    pub ascender: i16,
    pub descender: i16,
    pub cap_height: i16,
    pub bbox: [i16; 4],
    /// Outlines are CFF (`OTTO`) rather than TrueType.
    pub is_cff: bool,
    notdef_advance: u16,
    glyphs: HashMap<char, GlyphInfo>,
}

impl fmt::Debug for FontAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontAsset")
            .field("family", &self.family)
            .field("style", &self.style)
            .field("origin", &self.origin)
            .field("glyphs", &self.glyphs.len())
            .finish()
    }
}

impl FontAsset {
    /// Parses a TrueType/OpenType file (or the first face of a collection).
    pub fn from_data(data: Vec<u8>, style: FontStyle, origin: FontOrigin) -> Result<Self> {
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        let face_index = (0..count)
            .find(|index| Face::parse(&data, *index).is_ok())
            .ok_or_else(|| anyhow!("failed to parse font data"))?;
        Self::from_face(data, face_index, style, origin)
    }

    /// Parses face `face_index` of a font collection.
    pub fn from_face(data: Vec<u8>, face_index: u32, style: FontStyle, origin: FontOrigin) -> Result<Self> {
        let face = Face::parse(&data, face_index).map_err(|err| anyhow!("{}", err))?;

        let units_per_em = face.units_per_em().max(1);
        let notdef_advance = face
            .glyph_hor_advance(ttf_parser::GlyphId(0))
            .unwrap_or(units_per_em / 2);
        let mut glyphs = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|code| {
                    let Some(ch) = char::from_u32(code) else {
                        return;
                    };
                    if glyphs.contains_key(&ch) {
                        return;
                    }
                    if let Some(id) = subtable.glyph_index(code)
                        && id.0 != 0
                    {
                        let advance = face.glyph_hor_advance(id).unwrap_or(notdef_advance);
                        glyphs.insert(ch, GlyphInfo { id: id.0, advance });
                    }
                });
            }
        }
        if glyphs.is_empty() {
            return Err(anyhow!("font has no unicode cmap"));
        }

        let family = extract_family_name(&face).unwrap_or_else(|| "Unknown".to_string());
        let postscript_name = extract_name(&face, name_id::POST_SCRIPT_NAME)
            .map(|name| sanitize_postscript(&name))
            .unwrap_or_else(|| sanitize_postscript(&family));
        let rect = face.global_bounding_box();

        Ok(Self {
            family,
            postscript_name,
            style,
            origin,
            face_index,
            units_per_em,
            ascender: face.ascender(),
            descender: face.descender(),
            cap_height: face.capital_height().unwrap_or(face.ascender()),
            bbox: [rect.x_min, rect.y_min, rect.x_max, rect.y_max],
            is_cff: face.tables().cff.is_some(),
            notdef_advance,
            glyphs,
            data: Some(Arc::new(data)),
        })
    }

    /// Helvetica, with metrics only. Used when no script font can be loaded.
    pub fn builtin(style: FontStyle) -> Self {
        let mut glyphs = HashMap::new();
        for byte in 0x20u8..=0xFF {
            let ch = builtin::win_ansi_decode(byte);
            if let Some(width) = builtin::helvetica_width(ch) {
                glyphs.insert(
                    ch,
                    GlyphInfo {
                        id: byte as u16,
                        advance: width,
                    },
                );
            }
        }
        let postscript_name = match style {
            FontStyle::Regular => "Helvetica",
            FontStyle::Bold => "Helvetica-Bold",
            FontStyle::Italic => "Helvetica-Oblique",
            FontStyle::BoldItalic => "Helvetica-BoldOblique",
        };
        Self {
            family: BUILTIN_FAMILY.to_string(),
            postscript_name: postscript_name.to_string(),
            style,
            origin: FontOrigin::Builtin,
            data: None,
            face_index: 0,
            units_per_em: builtin::UNITS_PER_EM,
            ascender: builtin::ASCENT,
            descender: builtin::DESCENT,
            cap_height: builtin::CAP_HEIGHT,
            bbox: builtin::BBOX,
            is_cff: false,
            notdef_advance: builtin::MISSING_WIDTH,
            glyphs,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.origin == FontOrigin::Builtin
    }

    /// The font program, absent for the builtin font.
    pub fn data(&self) -> Option<&Arc<Vec<u8>>> {
        self.data.as_ref()
    }

    pub fn face_index(&self) -> u32 {
        self.face_index
    }

    /// Standalone font program for embedding. `None` for the builtin font or
    /// a collection face that cannot be copied out.
    pub fn program(&self) -> Option<Vec<u8>> {
        self.data
            .as_ref()
            .and_then(|data| sfnt::extract_face(data, self.face_index))
    }

    pub fn glyph(&self, ch: char) -> Option<GlyphInfo> {
        self.glyphs.get(&ch).copied()
    }

    /// Whitespace and control characters count as covered.
    pub fn covers(&self, ch: char) -> bool {
        ch.is_control() || ch.is_whitespace() || self.glyphs.contains_key(&ch)
    }

    /// Distinct characters of `text` the font cannot draw, in first-seen order.
    pub fn missing_chars(&self, text: &str) -> Vec<char> {
        let mut missing = Vec::new();
        for ch in text.chars() {
            if !self.covers(ch) && !missing.contains(&ch) {
                missing.push(ch);
            }
        }
        missing
    }

    pub fn advance_units(&self, ch: char) -> u16 {
        match self.glyphs.get(&ch) {
            Some(glyph) => glyph.advance,
            None if ch.is_whitespace() => self
                .glyphs
                .get(&' ')
                .map(|glyph| glyph.advance)
                .unwrap_or(self.units_per_em / 4),
            None => self.notdef_advance,
        }
    }

    /// Advance of a single character at `size`, in page units.
    pub fn advance(&self, ch: char, size: f32) -> f32 {
        if ch == '\n' {
            return 0.0;
        }
        self.advance_units(ch) as f32 * size / self.units_per_em as f32
    }

    pub fn measure(&self, text: &str, size: f32) -> f32 {
        text.chars().map(|ch| self.advance(ch, size)).sum()
    }

    pub fn ascent(&self, size: f32) -> f32 {
        self.ascender as f32 * size / self.units_per_em as f32
    }

    /// Positive distance below the baseline.
    pub fn descent(&self, size: f32) -> f32 {
        -(self.descender as f32) * size / self.units_per_em as f32
    }

    /// Contiguous covered code point ranges, inclusive.
    pub fn coverage(&self) -> Vec<(u32, u32)> {
        let mut codes: Vec<u32> = self.glyphs.keys().map(|ch| *ch as u32).collect();
        codes.sort_unstable();
        let mut ranges: Vec<(u32, u32)> = Vec::new();
        for code in codes {
            match ranges.last_mut() {
                Some((_, end)) if *end + 1 == code => *end = code,
                _ => ranges.push((code, code)),
            }
        }
        ranges
    }
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

fn extract_name(face: &Face<'_>, id: u16) -> Option<String> {
    face.names()
        .into_iter()
        .filter(|name| name.name_id == id)
        .find_map(|name| name.to_string())
}

/// PDF names may not contain whitespace or delimiters.
fn sanitize_postscript(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|ch| ch.is_ascii_graphic() && !"()<>[]{}/%#".contains(*ch))
        .collect();
    if cleaned.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};

    pub fn fixture_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fonts")
    }

    pub fn fixture_bytes(name: &str) -> Vec<u8> {
        std::fs::read(fixture_dir().join(name)).unwrap()
    }

    /// The same face with its program gone, like a collection member that
    /// cannot be sliced out.
    pub fn without_program(asset: super::FontAsset) -> super::FontAsset {
        super::FontAsset { data: None, ..asset }
    }
}
