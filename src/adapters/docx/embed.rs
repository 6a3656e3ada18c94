//! Embedded fonts for WordprocessingML packages: obfuscated `.odttf` parts
//! referenced from `word/fontTable.xml`.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::xml::{XmlDocument, XmlElement, XmlNode};
use crate::fonts::{FontAsset, FontStyle};

pub const FONT_TABLE: &str = "word/fontTable.xml";
pub const FONT_TABLE_RELS: &str = "word/_rels/fontTable.xml.rels";
pub const CONTENT_TYPES: &str = "[Content_Types].xml";
pub const SETTINGS: &str = "word/settings.xml";

const FONT_RELATIONSHIP: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/font";
const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const OBFUSCATED_FONT_TYPE: &str = "application/vnd.openxmlformats-officedocument.obfuscatedFont";

/// Only this many leading bytes of the font are obfuscated.
const OBFUSCATED_LEN: usize = 32;

/// `w:settings` children that must precede `w:embedTrueTypeFonts`.
const SETTINGS_BEFORE_EMBED: [&str; 10] = [
    "w:writeProtection",
    "w:view",
    "w:zoom",
    "w:removePersonalInformation",
    "w:removeDateAndTime",
    "w:doNotDisplayPageBoundaries",
    "w:displayBackgroundShape",
    "w:printPostScriptOverText",
    "w:printFractionalCharacterWidth",
    "w:printFormsData",
];

/// A font program ready to be stored in the package.
#[derive(Debug, Clone)]
pub struct EmbeddedFont {
    pub family: String,
    pub style: FontStyle,
    pub key: Uuid,
    pub part: String,
    pub data: Vec<u8>,
}

/// Collects the distinct TrueType fonts used by placements.
#[derive(Default)]
pub struct FontPackager {
    fonts: Vec<EmbeddedFont>,
    seen: HashMap<usize, Option<usize>>,
}

impl FontPackager {
    /// Queues `asset` for embedding. Returns false for fonts that cannot be
    /// embedded (builtin or CFF outlines).
    pub fn add(&mut self, asset: &Arc<FontAsset>) -> bool {
        let key = Arc::as_ptr(asset) as usize;
        if let Some(slot) = self.seen.get(&key) {
            return slot.is_some();
        }
        let program = if asset.is_cff { None } else { asset.program() };
        let Some(program) = program else {
            debug!("font {} is not embeddable in DOCX", asset.family);
            self.seen.insert(key, None);
            return false;
        };
        let uuid = Uuid::new_v4();
        let part = format!("word/fonts/font{}.odttf", self.fonts.len() + 1);
        self.seen.insert(key, Some(self.fonts.len()));
        self.fonts.push(EmbeddedFont {
            family: asset.family.clone(),
            style: asset.style,
            data: obfuscate(&program, &uuid),
            key: uuid,
            part,
        });
        true
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn fonts(&self) -> &[EmbeddedFont] {
        &self.fonts
    }

    /// Adds `w:embed*` entries to the font table and returns its
    /// relationships part with one target per embedded font.
    pub fn update_font_table(
        &self,
        font_table: &mut XmlDocument,
        rels: Option<XmlDocument>,
    ) -> Option<XmlDocument> {
        let Some(table) = font_table.root_mut() else {
            warn!("font table has no root element; fonts not embedded");
            return None;
        };
        let mut rels = rels.unwrap_or_else(empty_relationships);
        let root = rels.root_mut()?;
        let mut next_id = next_relationship_id(root);

        for font in &self.fonts {
            let rel_id = format!("rId{}", next_id);
            next_id += 1;
            let target = font.part.trim_start_matches("word/").to_string();
            root.children.push(XmlNode::Element(
                XmlElement::new("Relationship")
                    .with_attr("Id", rel_id.clone())
                    .with_attr("Type", FONT_RELATIONSHIP)
                    .with_attr("Target", target),
            ));

            let embed = XmlElement::new(embed_element(font.style))
                .with_attr("r:id", rel_id)
                .with_attr("w:fontKey", format!("{{{}}}", font.key.to_string().to_uppercase()));
            let position = table.children.iter().position(|node| {
                matches!(node, XmlNode::Element(element)
                    if element.name == "w:font" && element.attr("w:name") == Some(font.family.as_str()))
            });
            let position = match position {
                Some(position) => position,
                None => {
                    table.children.push(XmlNode::Element(
                        XmlElement::new("w:font").with_attr("w:name", font.family.clone()),
                    ));
                    table.children.len() - 1
                }
            };
            let XmlNode::Element(entry) = &mut table.children[position] else {
                continue;
            };
            entry
                .children
                .retain(|node| !matches!(node, XmlNode::Element(element) if element.name == embed.name));
            entry.children.push(XmlNode::Element(embed));
        }
        if table.attr("xmlns:r").is_none() {
            table.set_attr(
                "xmlns:r",
                "http://schemas.openxmlformats.org/officeDocument/2006/relationships",
            );
        }
        Some(rels)
    }
}

fn embed_element(style: FontStyle) -> &'static str {
    match style {
        FontStyle::Regular => "w:embedRegular",
        FontStyle::Bold => "w:embedBold",
        FontStyle::Italic => "w:embedItalic",
        FontStyle::BoldItalic => "w:embedBoldItalic",
    }
}

fn empty_relationships() -> XmlDocument {
    XmlDocument {
        nodes: vec![XmlNode::Element(
            XmlElement::new("Relationships").with_attr("xmlns", RELATIONSHIPS_NS),
        )],
    }
}

fn next_relationship_id(root: &XmlElement) -> usize {
    root.elements()
        .filter_map(|element| element.attr("Id"))
        .filter_map(|id| id.strip_prefix("rId"))
        .filter_map(|number| number.parse::<usize>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

/// Registers the `.odttf` content type once.
pub fn register_content_type(types: &mut XmlDocument) {
    let Some(root) = types.root_mut() else {
        return;
    };
    let exists = root
        .elements()
        .any(|element| element.name == "Default" && element.attr("Extension") == Some("odttf"));
    if !exists {
        root.children.insert(
            0,
            XmlNode::Element(
                XmlElement::new("Default")
                    .with_attr("Extension", "odttf")
                    .with_attr("ContentType", OBFUSCATED_FONT_TYPE),
            ),
        );
    }
}

/// Turns on `w:embedTrueTypeFonts`, respecting the schema's child order.
pub fn enable_embedding(settings: &mut XmlDocument) {
    let Some(root) = settings.root_mut() else {
        return;
    };
    if root.child("w:embedTrueTypeFonts").is_some() {
        return;
    }
    let position = root
        .children
        .iter()
        .position(|node| match node {
            XmlNode::Element(element) => !SETTINGS_BEFORE_EMBED.contains(&element.name.as_str()),
            _ => false,
        })
        .unwrap_or(root.children.len());
    root.children
        .insert(position, XmlNode::Element(XmlElement::new("w:embedTrueTypeFonts")));
}

/// XORs the first 32 bytes of the font with the GUID key, whose bytes are
/// taken from the hex digits in reverse order.
pub fn obfuscate(font: &[u8], key: &Uuid) -> Vec<u8> {
    let hex = key.simple().to_string();
    let digits = hex.as_bytes();
    let key_bytes: Vec<u8> = (0..16)
        .map(|index| {
            let at = digits.len() - 2 * (index + 1);
            let pair = std::str::from_utf8(&digits[at..at + 2]).unwrap_or("00");
            u8::from_str_radix(pair, 16).unwrap_or(0)
        })
        .collect();
    let mut out = font.to_vec();
    for (index, byte) in out.iter_mut().take(OBFUSCATED_LEN).enumerate() {
        *byte ^= key_bytes[index % key_bytes.len()];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::FontOrigin;
    use crate::fonts::test_support::fixture_bytes;
    use std::path::PathBuf;

    fn parse(xml: &str) -> XmlDocument {
        XmlDocument::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn obfuscation_xors_the_header_with_the_reversed_key() {
        let key = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let font = vec![0u8; 40];
        let out = obfuscate(&font, &key);
        assert_eq!(&out[..4], &[0xFF, 0xEE, 0xDD, 0xCC]);
        assert_eq!(out[15], 0x00);
        assert_eq!(out[16], 0xFF);
        assert_eq!(&out[32..], &[0u8; 8]);
        assert_eq!(obfuscate(&out, &key), font);
    }

    #[test]
    fn font_table_gains_embed_entries_and_relationships() {
        let data = fixture_bytes("DejaVuSans-Regular.ttf");
        let origin = FontOrigin::File(PathBuf::from("DejaVuSans-Regular.ttf"));
        let asset = Arc::new(FontAsset::from_data(data, FontStyle::Regular, origin).unwrap());
        let mut packager = FontPackager::default();
        assert!(packager.add(&asset));
        assert!(packager.add(&asset));
        assert!(!packager.add(&Arc::new(FontAsset::builtin(FontStyle::Regular))));
        assert_eq!(packager.fonts().len(), 1);

        let mut table = parse(r#"<w:fonts xmlns:w="urn:w"><w:font w:name="Calibri"/></w:fonts>"#);
        let rels = parse(
            r#"<Relationships xmlns="urn:rels"><Relationship Id="rId4" Type="x" Target="y"/></Relationships>"#,
        );
        let rels = packager.update_font_table(&mut table, Some(rels)).unwrap();

        let font = table.root().unwrap().elements().nth(1).unwrap();
        assert_eq!(font.attr("w:name"), Some("DejaVu Sans"));
        let embed = font.child("w:embedRegular").unwrap();
        assert_eq!(embed.attr("r:id"), Some("rId5"));
        assert!(embed.attr("w:fontKey").unwrap().starts_with('{'));

        let relationship = rels.root().unwrap().elements().nth(1).unwrap();
        assert_eq!(relationship.attr("Target"), Some("fonts/font1.odttf"));
        assert_eq!(relationship.attr("Type"), Some(FONT_RELATIONSHIP));
    }

    #[test]
    fn settings_flag_is_inserted_after_view_settings() {
        let mut settings = parse(r#"<w:settings><w:zoom w:percent="100"/><w:defaultTabStop w:val="720"/></w:settings>"#);
        enable_embedding(&mut settings);
        enable_embedding(&mut settings);
        let names: Vec<&str> = settings
            .root()
            .unwrap()
            .elements()
            .map(|element| element.name.as_str())
            .collect();
        assert_eq!(names, ["w:zoom", "w:embedTrueTypeFonts", "w:defaultTabStop"]);
    }

    #[test]
    fn content_type_is_registered_once() {
        let mut types = parse(r#"<Types><Default Extension="xml" ContentType="application/xml"/></Types>"#);
        register_content_type(&mut types);
        register_content_type(&mut types);
        assert_eq!(types.root().unwrap().elements().count(), 2);
    }
}
