//! Font embedding for reconstructed pages.
//!
//! Every loaded font becomes a Type0 font with `Identity-H` encoding, so the
//! bytes in a text-showing string are glyph ids. The widths and the
//! ToUnicode CMap list exactly the glyphs that were drawn. The builtin
//! fallback is referenced as a standard Type1 font with `WinAnsiEncoding`,
//! and also stands in for any face whose program cannot be extracted.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use super::cmap::write_to_unicode;
use crate::fonts::{FontAsset, builtin};

/// Resource name prefix for embedded fonts; unlikely to clash with the
/// names a producer already used.
const RESOURCE_PREFIX: &str = "LTF";

/// Symbolic: glyphs outside the standard Latin set.
const FLAG_SYMBOLIC: i64 = 4;
const FLAG_ITALIC: i64 = 64;
const STEM_V: i64 = 80;

struct EmbeddedFont {
    resource: String,
    id: ObjectId,
    asset: Arc<FontAsset>,
    /// `None` for the builtin font.
    program: Option<Vec<u8>>,
    /// Glyph id to the character drawn with it.
    used: BTreeMap<u16, char>,
    /// Glyph id to advance in font units.
    widths: BTreeMap<u16, u16>,
}

#[derive(Default)]
pub struct FontEmbedder {
    fonts: Vec<EmbeddedFont>,
    by_asset: HashMap<usize, usize>,
}

impl FontEmbedder {
    /// Registers `asset` once per document and returns its resource name and
    /// the object id reserved for its font dictionary.
    pub fn register(&mut self, pdf: &mut Document, asset: &Arc<FontAsset>) -> (String, ObjectId) {
        let key = Arc::as_ptr(asset) as usize;
        if let Some(index) = self.by_asset.get(&key) {
            let font = &self.fonts[*index];
            return (font.resource.clone(), font.id);
        }
        let (asset, program) = match asset.program() {
            Some(program) => (Arc::clone(asset), Some(program)),
            None if asset.is_builtin() => (Arc::clone(asset), None),
            None => {
                warn!(
                    "no embeddable program for face {} of {}; drawing with the builtin font",
                    asset.face_index(),
                    asset.family
                );
                (Arc::new(FontAsset::builtin(asset.style)), None)
            }
        };
        let resource = format!("{}{}", RESOURCE_PREFIX, self.fonts.len());
        let id = pdf.new_object_id();
        self.by_asset.insert(key, self.fonts.len());
        self.fonts.push(EmbeddedFont {
            resource: resource.clone(),
            id,
            asset,
            program,
            used: BTreeMap::new(),
            widths: BTreeMap::new(),
        });
        (resource, id)
    }

    /// Encodes `text` for a text-showing operator with the font registered
    /// under `resource`. Characters the font lacks use glyph 0 (or `?` for
    /// the builtin font).
    pub fn encode(&mut self, resource: &str, text: &str) -> Object {
        let Some(font) = self.fonts.iter_mut().find(|font| font.resource == resource) else {
            return Object::String(Vec::new(), StringFormat::Literal);
        };
        if font.asset.is_builtin() {
            let bytes = text
                .chars()
                .filter(|ch| !ch.is_control())
                .map(|ch| builtin::win_ansi_encode(ch).unwrap_or(b'?'))
                .collect();
            return Object::String(bytes, StringFormat::Literal);
        }

        let mut bytes = Vec::with_capacity(text.len() * 2);
        for ch in text.chars().filter(|ch| !ch.is_control()) {
            let (gid, advance) = match font.asset.glyph(ch) {
                Some(glyph) => {
                    font.used.entry(glyph.id).or_insert(ch);
                    (glyph.id, glyph.advance)
                }
                None => (0, font.asset.advance_units(ch)),
            };
            font.widths.insert(gid, advance);
            bytes.extend_from_slice(&gid.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }

    /// Writes the font dictionaries into their reserved ids.
    pub fn finish(self, pdf: &mut Document) {
        for mut font in self.fonts {
            let object = match font.program.take() {
                Some(program) => embed_font(pdf, &font, program),
                None => builtin_font(&font.asset),
            };
            debug!(
                "embedded {} as {} with {} glyph(s)",
                font.asset.postscript_name,
                font.resource,
                font.widths.len()
            );
            pdf.objects.insert(font.id, Object::Dictionary(object));
        }
    }
}

fn builtin_font(asset: &FontAsset) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => asset.postscript_name.as_str(),
        "Encoding" => "WinAnsiEncoding",
    }
}

fn embed_font(pdf: &mut Document, font: &EmbeddedFont, program: Vec<u8>) -> Dictionary {
    let asset = &font.asset;
    let scale = 1000.0 / asset.units_per_em as f32;
    let to_pdf = |value: i32| (value as f32 * scale).round() as i64;

    let mut file_stream = if asset.is_cff {
        Stream::new(dictionary! { "Subtype" => "OpenType" }, program)
    } else {
        let length = program.len() as i64;
        Stream::new(dictionary! { "Length1" => length }, program)
    };
    let _ = file_stream.compress();
    let file_id = pdf.add_object(file_stream);

    let mut descriptor = dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => asset.postscript_name.as_str(),
        "Flags" => FLAG_SYMBOLIC | if asset.style.is_italic() { FLAG_ITALIC } else { 0 },
        "FontBBox" => asset.bbox.iter().map(|value| Object::Integer(to_pdf(*value as i32))).collect::<Vec<_>>(),
        "ItalicAngle" => 0,
        "Ascent" => to_pdf(asset.ascender as i32),
        "Descent" => to_pdf(asset.descender as i32),
        "CapHeight" => to_pdf(asset.cap_height as i32),
        "StemV" => STEM_V,
    };
    descriptor.set(if asset.is_cff { "FontFile3" } else { "FontFile2" }, file_id);
    let descriptor_id = pdf.add_object(descriptor);

    let widths: Vec<Object> = font
        .widths
        .iter()
        .flat_map(|(gid, advance)| {
            [
                Object::Integer(*gid as i64),
                Object::Array(vec![Object::Integer(to_pdf(*advance as i32))]),
            ]
        })
        .collect();
    let mut cid_font = dictionary! {
        "Type" => "Font",
        "Subtype" => if asset.is_cff { "CIDFontType0" } else { "CIDFontType2" },
        "BaseFont" => asset.postscript_name.as_str(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 1000,
        "W" => widths,
    };
    if !asset.is_cff {
        cid_font.set("CIDToGIDMap", "Identity");
    }
    let cid_font_id = pdf.add_object(cid_font);

    let mut to_unicode = Stream::new(dictionary! {}, write_to_unicode(&font.used).into_bytes());
    let _ = to_unicode.compress();
    let to_unicode_id = pdf.add_object(to_unicode);

    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => asset.postscript_name.as_str(),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
        "ToUnicode" => to_unicode_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::test_support::{fixture_bytes, without_program};
    use crate::fonts::{FontOrigin, FontStyle};
    use std::path::PathBuf;

    fn dejavu() -> Arc<FontAsset> {
        let data = fixture_bytes("DejaVuSans-Regular.ttf");
        let origin = FontOrigin::File(PathBuf::from("DejaVuSans-Regular.ttf"));
        Arc::new(FontAsset::from_data(data, FontStyle::Regular, origin).unwrap())
    }

    #[test]
    fn registers_each_font_once() {
        let mut pdf = Document::with_version("1.5");
        let mut embedder = FontEmbedder::default();
        let font = dejavu();
        let first = embedder.register(&mut pdf, &font);
        let second = embedder.register(&mut pdf, &font);
        assert_eq!(first, second);
        assert_eq!(first.0, "LTF0");
    }

    #[test]
    fn encodes_glyph_ids_and_records_usage() {
        let mut pdf = Document::with_version("1.5");
        let mut embedder = FontEmbedder::default();
        let font = dejavu();
        let (name, id) = embedder.register(&mut pdf, &font);
        let gid_a = font.glyph('A').unwrap().id;

        let Object::String(bytes, StringFormat::Hexadecimal) = embedder.encode(&name, "AA\u{10FFFD}") else {
            panic!("expected a hex string");
        };
        assert_eq!(&bytes[..2], &gid_a.to_be_bytes());
        assert_eq!(&bytes[4..], &[0, 0]);

        embedder.finish(&mut pdf);
        let type0 = pdf.get_dictionary(id).unwrap();
        assert_eq!(type0.get(b"Subtype").unwrap().as_name().unwrap(), b"Type0");
        assert_eq!(type0.get(b"Encoding").unwrap().as_name().unwrap(), b"Identity-H");

        let descendants = type0.get(b"DescendantFonts").unwrap().as_array().unwrap();
        let cid_font = pdf.get_dictionary(descendants[0].as_reference().unwrap()).unwrap();
        assert_eq!(cid_font.get(b"Subtype").unwrap().as_name().unwrap(), b"CIDFontType2");
        let widths = cid_font.get(b"W").unwrap().as_array().unwrap();
        assert_eq!(widths.len(), 4);

        let descriptor = pdf
            .get_dictionary(cid_font.get(b"FontDescriptor").unwrap().as_reference().unwrap())
            .unwrap();
        assert!(descriptor.get(b"FontFile2").is_ok());

        let to_unicode = pdf
            .get_object(type0.get(b"ToUnicode").unwrap().as_reference().unwrap())
            .unwrap()
            .as_stream()
            .unwrap();
        let cmap = String::from_utf8(to_unicode.decompressed_content().unwrap()).unwrap();
        assert!(cmap.contains("1 beginbfchar"));
        assert!(cmap.contains(&format!("<{:04X}> <0041>", gid_a)));
    }

    #[test]
    fn builtin_font_uses_win_ansi_bytes() {
        let mut pdf = Document::with_version("1.5");
        let mut embedder = FontEmbedder::default();
        let font = Arc::new(FontAsset::builtin(FontStyle::Bold));
        let (name, id) = embedder.register(&mut pdf, &font);
        let encoded = embedder.encode(&name, "Café €ж");
        assert_eq!(
            encoded,
            Object::String(vec![b'C', b'a', b'f', 0xE9, b' ', 0x80, b'?'], StringFormat::Literal)
        );
        embedder.finish(&mut pdf);
        let dict = pdf.get_dictionary(id).unwrap();
        assert_eq!(dict.get(b"BaseFont").unwrap().as_name().unwrap(), b"Helvetica-Bold");
    }

    #[test]
    fn faces_without_a_program_are_drawn_with_the_builtin_font() {
        let mut pdf = Document::with_version("1.5");
        let mut embedder = FontEmbedder::default();
        let data = fixture_bytes("DejaVuSans-Regular.ttf");
        let origin = FontOrigin::File(PathBuf::from("DejaVuSans-Regular.ttf"));
        let font = Arc::new(without_program(FontAsset::from_data(data, FontStyle::Regular, origin).unwrap()));

        let (name, id) = embedder.register(&mut pdf, &font);
        assert_eq!(embedder.encode(&name, "Hi"), Object::String(b"Hi".to_vec(), StringFormat::Literal));
        embedder.finish(&mut pdf);

        let dict = pdf.get_dictionary(id).unwrap();
        assert_eq!(dict.get(b"Subtype").unwrap().as_name().unwrap(), b"Type1");
        assert_eq!(dict.get(b"BaseFont").unwrap().as_name().unwrap(), b"Helvetica");
    }
}
