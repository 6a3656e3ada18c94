//! WordprocessingML adapter.
//!
//! Every `w:p` with visible text in the main document, headers, footers,
//! footnotes and endnotes becomes one unit. DOCX has no fixed geometry, so
//! boxes are estimated by flowing paragraphs down pages sized from the
//! section properties. On render the package is rewritten entry by entry
//! and only the edited parts change.

mod embed;
mod paragraph;
mod xml;

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use self::embed::{CONTENT_TYPES, FONT_TABLE, FONT_TABLE_RELS, FontPackager, SETTINGS};
use self::paragraph::{points_from_half_points, read_paragraph, rewrite_paragraph};
use self::xml::{XmlDocument, XmlElement, XmlNode};
use super::{DocumentAdapter, RenderContext};
use crate::data::DocumentFormat;
use crate::error::{EngineError, Result};
use crate::layout::is_renderable;
use crate::model::{BBox, Document, Page, SourceRef, StyleFlags, TextUnit};

const DOCUMENT_PART: &str = "word/document.xml";
const STYLES_PART: &str = "word/styles.xml";

/// Twips per point.
const TWIPS: f32 = 20.0;
/// US Letter with one-inch margins, used when the section says nothing.
const DEFAULT_PAGE: (f32, f32) = (612.0, 792.0);
const DEFAULT_MARGIN: f32 = 72.0;
/// Word's default body size when neither the run nor the styles set one.
const DEFAULT_FONT_SIZE: f32 = 11.0;
/// Average glyph advance as a fraction of the font size.
const AVERAGE_ADVANCE: f32 = 0.5;
const LINE_HEIGHT: f32 = 1.2;
const PARAGRAPH_GAP: f32 = 0.5;

pub struct DocxAdapter;

impl DocumentAdapter for DocxAdapter {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn extract(&self, bytes: Vec<u8>) -> Result<Document> {
        let corrupt = |reason: String| EngineError::corrupt(DocumentFormat::Docx, reason);
        let entries = read_entries(&bytes).map_err(corrupt)?;
        let main = entries
            .iter()
            .find(|entry| entry.name == DOCUMENT_PART)
            .ok_or_else(|| corrupt(format!("missing {}", DOCUMENT_PART)))?;
        let main = XmlDocument::parse(&main.data).map_err(|err| corrupt(format!("{}: {}", DOCUMENT_PART, err)))?;

        let base_size = entries
            .iter()
            .find(|entry| entry.name == STYLES_PART)
            .and_then(|entry| XmlDocument::parse(&entry.data).ok())
            .and_then(|styles| default_font_size(&styles))
            .unwrap_or(DEFAULT_FONT_SIZE);
        let mut flow = Flow::new(PageGeometry::from_document(&main));

        let mut parts: Vec<&Entry> = entries.iter().filter(|entry| part_rank(&entry.name).is_some()).collect();
        parts.sort_by(|a, b| (part_rank(&a.name), &a.name).cmp(&(part_rank(&b.name), &b.name)));
        for entry in parts {
            let parsed = if entry.name == DOCUMENT_PART {
                main.clone()
            } else {
                match XmlDocument::parse(&entry.data) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        warn!("skipping unreadable part {}: {}", entry.name, err);
                        continue;
                    }
                }
            };
            let before = flow.unit_count();
            let mut ordinal = 0;
            for node in &parsed.nodes {
                if let XmlNode::Element(element) = node {
                    collect_units(element, &entry.name, &mut ordinal, base_size, &mut flow);
                }
            }
            debug!(
                "{}: {} paragraph(s), {} with text",
                entry.name,
                ordinal,
                flow.unit_count() - before
            );
        }

        let mut document = Document::new(DocumentFormat::Docx, bytes);
        document.pages = flow.pages;
        info!(
            "extracted {} unit(s) over {} synthesized page(s)",
            document.unit_count(),
            document.pages.len()
        );
        Ok(document)
    }

    fn render(&self, document: &Document, _context: &RenderContext<'_>) -> Result<Vec<u8>> {
        let mut edits: HashMap<&str, HashMap<usize, &TextUnit>> = HashMap::new();
        for unit in document.units().filter(|unit| is_renderable(unit)) {
            if let SourceRef::Docx { part, paragraph } = &unit.source_ref {
                edits.entry(part.as_str()).or_default().insert(*paragraph, unit);
            }
        }

        let mut entries = read_entries(&document.original).map_err(EngineError::Render)?;
        let mut packager = FontPackager::default();
        let mut rewritten = 0;
        for entry in entries.iter_mut() {
            let Some(paragraphs) = edits.get(entry.name.as_str()) else {
                continue;
            };
            let mut part = parse_part(entry)?;
            let mut ordinal = 0;
            for node in part.nodes.iter_mut() {
                if let XmlNode::Element(element) = node {
                    rewritten += rewrite_units(element, &mut ordinal, paragraphs, &mut packager);
                }
            }
            entry.data = serialize_part(&entry.name, &part)?;
        }
        if !packager.is_empty() {
            embed_fonts(&mut entries, &packager)?;
        }

        let out = write_entries(&entries)?;
        info!(
            "rendered DOCX: {} paragraph(s) rewritten, {} font(s) embedded, {} bytes",
            rewritten,
            packager.fonts().len(),
            out.len()
        );
        Ok(out)
    }
}

/// Translatable parts in output order; `None` for everything else.
fn part_rank(name: &str) -> Option<u8> {
    let xml = name.ends_with(".xml");
    match name {
        DOCUMENT_PART => Some(0),
        _ if xml && name.starts_with("word/header") => Some(1),
        _ if xml && name.starts_with("word/footer") => Some(2),
        "word/footnotes.xml" => Some(3),
        "word/endnotes.xml" => Some(4),
        _ => None,
    }
}

fn default_font_size(styles: &XmlDocument) -> Option<f32> {
    styles
        .root()?
        .find("w:docDefaults")?
        .find("w:sz")?
        .attr("w:val")?
        .parse::<f32>()
        .ok()
        .and_then(points_from_half_points)
}

/// Counts paragraphs in pre-order and turns those with text into units.
fn collect_units(element: &XmlElement, part: &str, ordinal: &mut usize, base_size: f32, flow: &mut Flow) {
    if element.name == "w:p" {
        let index = *ordinal;
        *ordinal += 1;
        let text = read_paragraph(element);
        let size = text.font_size.unwrap_or(base_size);
        if text.text.is_empty() {
            flow.skip(size);
        } else {
            let bbox = flow.place(&text.text, size);
            let mut unit = TextUnit::new(
                text.text,
                bbox,
                SourceRef::Docx {
                    part: part.to_string(),
                    paragraph: index,
                },
            );
            unit.baseline = bbox.y + size;
            unit.font_size = size;
            unit.style = StyleFlags {
                bold: text.bold,
                italic: text.italic,
            };
            unit.alignment = text.alignment;
            unit.is_heading = text.is_heading;
            flow.push(unit);
        }
    }
    for child in element.elements() {
        collect_units(child, part, ordinal, base_size, flow);
    }
}

fn rewrite_units(
    element: &mut XmlElement,
    ordinal: &mut usize,
    edits: &HashMap<usize, &TextUnit>,
    packager: &mut FontPackager,
) -> usize {
    let mut rewritten = 0;
    if element.name == "w:p" {
        let index = *ordinal;
        *ordinal += 1;
        if let Some((unit, translation)) = edits
            .get(&index)
            .and_then(|unit| unit.replacement().map(|text| (unit, text)))
        {
            let family = unit.placement().filter(|placement| !placement.font.is_builtin()).map(|placement| {
                packager.add(&placement.font);
                placement.font.family.as_str()
            });
            rewrite_paragraph(element, translation, unit.style.bold, family);
            rewritten += 1;
        }
    }
    for child in element.children.iter_mut() {
        if let XmlNode::Element(child) = child {
            rewritten += rewrite_units(child, ordinal, edits, packager);
        }
    }
    rewritten
}

fn embed_fonts(entries: &mut Vec<Entry>, packager: &FontPackager) -> Result<()> {
    let position = |entries: &[Entry], name: &str| entries.iter().position(|entry| entry.name == name);
    let Some(table_index) = position(entries, FONT_TABLE) else {
        warn!("package has no {}; fonts not embedded", FONT_TABLE);
        return Ok(());
    };
    let mut table = parse_part(&entries[table_index])?;
    let rels = match position(entries, FONT_TABLE_RELS) {
        Some(index) => Some(parse_part(&entries[index])?),
        None => None,
    };
    let Some(rels) = packager.update_font_table(&mut table, rels) else {
        return Ok(());
    };
    entries[table_index].data = serialize_part(FONT_TABLE, &table)?;
    upsert(entries, FONT_TABLE_RELS, serialize_part(FONT_TABLE_RELS, &rels)?);
    for font in packager.fonts() {
        upsert(entries, &font.part, font.data.clone());
    }

    if let Some(index) = position(entries, CONTENT_TYPES) {
        let mut types = parse_part(&entries[index])?;
        embed::register_content_type(&mut types);
        entries[index].data = serialize_part(CONTENT_TYPES, &types)?;
    }
    if let Some(index) = position(entries, SETTINGS) {
        let mut settings = parse_part(&entries[index])?;
        embed::enable_embedding(&mut settings);
        entries[index].data = serialize_part(SETTINGS, &settings)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PageGeometry {
    width: f32,
    height: f32,
    top: f32,
    right: f32,
    bottom: f32,
    left: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            width: DEFAULT_PAGE.0,
            height: DEFAULT_PAGE.1,
            top: DEFAULT_MARGIN,
            right: DEFAULT_MARGIN,
            bottom: DEFAULT_MARGIN,
            left: DEFAULT_MARGIN,
        }
    }
}

impl PageGeometry {
    /// Reads the last section's `w:pgSz` and `w:pgMar`.
    fn from_document(document: &XmlDocument) -> Self {
        let mut geometry = Self::default();
        let Some(section) = document
            .root()
            .and_then(|root| root.child("w:body"))
            .and_then(|body| body.child("w:sectPr").or_else(|| body.find("w:sectPr")))
        else {
            return geometry;
        };
        let points = |element: Option<&XmlElement>, key: &str| {
            element
                .and_then(|element| element.attr(key))
                .and_then(|value| value.parse::<f32>().ok())
                .map(|twips| twips.abs() / TWIPS)
        };
        let size = section.child("w:pgSz");
        let margins = section.child("w:pgMar");
        geometry.width = points(size, "w:w").unwrap_or(geometry.width);
        geometry.height = points(size, "w:h").unwrap_or(geometry.height);
        geometry.top = points(margins, "w:top").unwrap_or(geometry.top);
        geometry.right = points(margins, "w:right").unwrap_or(geometry.right);
        geometry.bottom = points(margins, "w:bottom").unwrap_or(geometry.bottom);
        geometry.left = points(margins, "w:left").unwrap_or(geometry.left);

        if geometry.content_width() < DEFAULT_MARGIN || geometry.content_height() < DEFAULT_MARGIN {
            debug!("section geometry {:?} leaves no room for text; using defaults", geometry);
            return Self::default();
        }
        geometry
    }

    fn content_width(&self) -> f32 {
        self.width - self.left - self.right
    }

    fn content_height(&self) -> f32 {
        self.height - self.top - self.bottom
    }
}

/// Stacks paragraph boxes down synthesized pages.
struct Flow {
    geometry: PageGeometry,
    pages: Vec<Page>,
    cursor: f32,
}

impl Flow {
    fn new(geometry: PageGeometry) -> Self {
        Self {
            pages: vec![Page::new(0, geometry.width, geometry.height)],
            cursor: geometry.top,
            geometry,
        }
    }

    fn unit_count(&self) -> usize {
        self.pages.iter().map(|page| page.units.len()).sum()
    }

    fn place(&mut self, text: &str, size: f32) -> BBox {
        let geometry = self.geometry;
        let width = geometry.content_width();
        let chars = text.chars().count() as f32;
        let lines = (chars * size * AVERAGE_ADVANCE / width).ceil().max(1.0);
        let height = (lines * size * LINE_HEIGHT).min(geometry.content_height());
        if self.cursor + height > geometry.height - geometry.bottom && self.cursor > geometry.top {
            self.break_page();
        }
        let bbox = BBox::new(geometry.left, self.cursor, width, height);
        self.cursor += height + size * PARAGRAPH_GAP;
        bbox
    }

    fn skip(&mut self, size: f32) {
        self.cursor += size * LINE_HEIGHT;
        if self.cursor > self.geometry.height - self.geometry.bottom {
            self.break_page();
        }
    }

    fn break_page(&mut self) {
        let index = self.pages.len();
        self.pages
            .push(Page::new(index, self.geometry.width, self.geometry.height));
        self.cursor = self.geometry.top;
    }

    fn push(&mut self, unit: TextUnit) {
        if let Some(page) = self.pages.last_mut() {
            page.units.push(unit);
        }
    }
}

struct Entry {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
}

fn read_entries(bytes: &[u8]) -> std::result::Result<Vec<Entry>, String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|err| format!("failed to read zip archive: {}", err))?;
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|err| format!("failed to read zip entry: {}", err))?;
        let mut data = Vec::new();
        if !file.is_dir() {
            file.read_to_end(&mut data)
                .map_err(|err| format!("failed to read zip entry content: {}", err))?;
        }
        entries.push(Entry {
            name: file.name().to_string(),
            compression: file.compression(),
            is_dir: file.is_dir(),
            data,
        });
    }
    Ok(entries)
}

fn write_entries(entries: &[Entry]) -> Result<Vec<u8>> {
    let zip_error = |err: zip::result::ZipError| EngineError::Render(format!("failed to write zip output: {}", err));
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        let file_options = FileOptions::default().compression_method(entry.compression);
        if entry.is_dir {
            writer
                .add_directory(entry.name.clone(), file_options)
                .map_err(zip_error)?;
            continue;
        }
        writer
            .start_file(entry.name.clone(), file_options)
            .map_err(zip_error)?;
        writer.write_all(&entry.data)?;
    }
    Ok(writer.finish().map_err(zip_error)?.into_inner())
}

fn upsert(entries: &mut Vec<Entry>, name: &str, data: Vec<u8>) {
    match entries.iter_mut().find(|entry| entry.name == name) {
        Some(entry) => entry.data = data,
        None => entries.push(Entry {
            name: name.to_string(),
            data,
            compression: CompressionMethod::Deflated,
            is_dir: false,
        }),
    }
}

fn parse_part(entry: &Entry) -> Result<XmlDocument> {
    XmlDocument::parse(&entry.data).map_err(|err| EngineError::Render(format!("{}: {}", entry.name, err)))
}

fn serialize_part(name: &str, part: &XmlDocument) -> Result<Vec<u8>> {
    part.to_bytes()
        .map_err(|err| EngineError::Render(format!("{}: {}", name, err)))
}
