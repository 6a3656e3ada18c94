//! Content stream interpreter: tracks the graphics and text state and reports
//! every text-showing operation with its position in user space.

use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;

use super::font::PdfFont;
use super::resolve;
use crate::model::{BBox, BlobKind};

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(x: f32, y: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, x, y)
    }

    /// `self` applied first, then `other`.
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.a + y * self.c + self.e, x * self.b + y * self.d + self.f)
    }

    /// Length of the transformed unit y vector.
    pub fn vertical_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let values = numbers(operands);
        if values.len() < 6 {
            return None;
        }
        Some(Self::new(values[0], values[1], values[2], values[3], values[4], values[5]))
    }
}

/// A run of text drawn by one text-showing operator, in PDF user space
/// (origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub op_index: usize,
    pub x0: f32,
    pub x1: f32,
    pub baseline: f32,
    pub size: f32,
    pub ascent: f32,
    pub descent: f32,
    pub font_name: String,
    pub bold: bool,
    pub italic: bool,
    /// `TJ` adjustment, in thousandths of text space, that moves the text
    /// position as far as this operation did.
    pub adjustment: f32,
}

/// An image or form XObject placement, in PDF user space.
#[derive(Debug, Clone, PartialEq)]
pub struct XObjectPlacement {
    pub name: String,
    pub kind: BlobKind,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

#[derive(Debug, Default)]
pub struct PageContent {
    pub spans: Vec<TextSpan>,
    pub xobjects: Vec<XObjectPlacement>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<String>,
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    rise: f32,
    render_mode: i64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
        }
    }
}

/// Invisible text (render mode 3) is the OCR layer of scanned PDFs.
const INVISIBLE_RENDER_MODE: i64 = 3;

/// TJ adjustments beyond this many thousandths of an em read as a space.
const TJ_SPACE_THRESHOLD: f32 = 250.0;

pub struct Interpreter<'a> {
    doc: &'a Document,
    fonts: HashMap<String, PdfFont>,
    xobjects: Option<&'a Dictionary>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    out: PageContent,
}

impl<'a> Interpreter<'a> {
    pub fn new(doc: &'a Document, resources: Option<&'a Dictionary>) -> Self {
        let mut fonts = HashMap::new();
        if let Some(font_dict) = resources
            .and_then(|res| res.get(b"Font").ok())
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok())
        {
            for (name, value) in font_dict.iter() {
                if let Some(dict) = resolve(doc, value).and_then(|obj| obj.as_dict().ok()) {
                    fonts.insert(String::from_utf8_lossy(name).into_owned(), PdfFont::load(doc, dict));
                }
            }
        }
        let xobjects = resources
            .and_then(|res| res.get(b"XObject").ok())
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok());

        Self {
            doc,
            fonts,
            xobjects,
            state: GraphicsState::default(),
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            out: PageContent::default(),
        }
    }

    pub fn run(mut self, operations: &[Operation]) -> PageContent {
        for (index, op) in operations.iter().enumerate() {
            self.step(index, op);
        }
        self.out
    }

    fn step(&mut self, index: usize, op: &Operation) {
        let operands = &op.operands;
        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let Some(matrix) = Matrix::from_operands(operands) {
                    self.state.ctm = matrix.then(&self.state.ctm);
                }
            }
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(name) = operands.first().and_then(|obj| obj.as_name().ok()) {
                    self.state.font = Some(String::from_utf8_lossy(name).into_owned());
                }
                if let Some(size) = number_at(operands, 1) {
                    self.state.size = size;
                }
            }
            "Tc" => self.state.char_spacing = number_at(operands, 0).unwrap_or(0.0),
            "Tw" => self.state.word_spacing = number_at(operands, 0).unwrap_or(0.0),
            "Tz" => self.state.horizontal_scale = number_at(operands, 0).unwrap_or(100.0) / 100.0,
            "TL" => self.state.leading = number_at(operands, 0).unwrap_or(0.0),
            "Ts" => self.state.rise = number_at(operands, 0).unwrap_or(0.0),
            "Tr" => {
                self.state.render_mode = operands.first().and_then(|obj| obj.as_i64().ok()).unwrap_or(0);
            }
            "Td" => {
                let (tx, ty) = (number_at(operands, 0).unwrap_or(0.0), number_at(operands, 1).unwrap_or(0.0));
                self.move_line(tx, ty);
            }
            "TD" => {
                let (tx, ty) = (number_at(operands, 0).unwrap_or(0.0), number_at(operands, 1).unwrap_or(0.0));
                self.state.leading = -ty;
                self.move_line(tx, ty);
            }
            "Tm" => {
                if let Some(matrix) = Matrix::from_operands(operands) {
                    self.tm = matrix;
                    self.tlm = matrix;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(bytes) = operands.first().and_then(|obj| obj.as_str().ok()) {
                    self.show(index, &[ShowItem::Text(bytes)]);
                }
            }
            "'" => {
                self.next_line();
                if let Some(bytes) = operands.first().and_then(|obj| obj.as_str().ok()) {
                    self.show(index, &[ShowItem::Text(bytes)]);
                }
            }
            "\"" => {
                self.state.word_spacing = number_at(operands, 0).unwrap_or(0.0);
                self.state.char_spacing = number_at(operands, 1).unwrap_or(0.0);
                self.next_line();
                if let Some(bytes) = operands.get(2).and_then(|obj| obj.as_str().ok()) {
                    self.show(index, &[ShowItem::Text(bytes)]);
                }
            }
            "TJ" => {
                if let Some(array) = operands.first().and_then(|obj| obj.as_array().ok()) {
                    let items: Vec<ShowItem<'_>> = array
                        .iter()
                        .filter_map(|item| match item {
                            Object::String(bytes, _) => Some(ShowItem::Text(bytes)),
                            other => other.as_float().ok().map(ShowItem::Adjust),
                        })
                        .collect();
                    self.show(index, &items);
                }
            }
            "Do" => {
                if let Some(name) = operands.first().and_then(|obj| obj.as_name().ok()) {
                    self.place_xobject(&String::from_utf8_lossy(name));
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_line(0.0, -leading);
    }

    fn show(&mut self, op_index: usize, items: &[ShowItem<'_>]) {
        let unknown;
        let font = match self.state.font.as_ref().and_then(|name| self.fonts.get(name)) {
            Some(font) => font,
            None => {
                unknown = PdfFont::unknown();
                &unknown
            }
        };
        let size = self.state.size;
        let scale = self.state.horizontal_scale;

        let start = self.text_origin();
        let mut text = String::new();
        let mut displacement = 0.0;
        for item in items {
            match item {
                ShowItem::Text(bytes) => {
                    for glyph in font.decode(bytes) {
                        text.push_str(&glyph.text);
                        let spacing = self.state.char_spacing + if glyph.is_space { self.state.word_spacing } else { 0.0 };
                        let advance = (glyph.width / 1000.0 * size + spacing) * scale;
                        displacement += advance;
                        self.tm = Matrix::translate(advance, 0.0).then(&self.tm);
                    }
                }
                ShowItem::Adjust(amount) => {
                    if *amount < -TJ_SPACE_THRESHOLD && !text.is_empty() && !text.ends_with(' ') {
                        text.push(' ');
                    }
                    let advance = -amount / 1000.0 * size * scale;
                    displacement += advance;
                    self.tm = Matrix::translate(advance, 0.0).then(&self.tm);
                }
            }
        }
        let end = self.text_origin();

        if self.state.render_mode == INVISIBLE_RENDER_MODE || text.trim().is_empty() {
            return;
        }
        let rendering = self.tm.then(&self.state.ctm);
        let effective = size.abs() * rendering.vertical_scale();
        self.out.spans.push(TextSpan {
            text,
            op_index,
            x0: start.0.min(end.0),
            x1: start.0.max(end.0),
            baseline: start.1,
            size: effective,
            ascent: font.ascent / 1000.0 * effective,
            descent: -font.descent / 1000.0 * effective,
            font_name: font.base_font.clone(),
            bold: font.bold,
            italic: font.italic,
            adjustment: if size * scale == 0.0 {
                0.0
            } else {
                -displacement * 1000.0 / (size * scale)
            },
        });
    }

    /// Current glyph origin in user space, rise included.
    fn text_origin(&self) -> (f32, f32) {
        let rendering = Matrix::translate(0.0, self.state.rise)
            .then(&self.tm)
            .then(&self.state.ctm);
        rendering.apply(0.0, 0.0)
    }

    fn place_xobject(&mut self, name: &str) {
        let Some(stream) = self
            .xobjects
            .and_then(|dict| dict.get(name.as_bytes()).ok())
            .and_then(|obj| resolve(self.doc, obj))
            .and_then(|obj| obj.as_stream().ok())
        else {
            return;
        };
        let kind = match stream.dict.get(b"Subtype").ok().and_then(|obj| obj.as_name().ok()) {
            Some(b"Image") => BlobKind::Image,
            Some(b"Form") => BlobKind::Form,
            _ => return,
        };
        let ctm = self.state.ctm;
        let corners = [ctm.apply(0.0, 0.0), ctm.apply(1.0, 0.0), ctm.apply(0.0, 1.0), ctm.apply(1.0, 1.0)];
        let xs = corners.iter().map(|point| point.0);
        let ys = corners.iter().map(|point| point.1);
        self.out.xobjects.push(XObjectPlacement {
            name: name.to_string(),
            kind,
            x0: xs.clone().fold(f32::MAX, f32::min),
            x1: xs.fold(f32::MIN, f32::max),
            y0: ys.clone().fold(f32::MAX, f32::min),
            y1: ys.fold(f32::MIN, f32::max),
        });
    }
}

enum ShowItem<'b> {
    Text(&'b [u8]),
    Adjust(f32),
}

fn numbers(operands: &[Object]) -> Vec<f32> {
    operands.iter().filter_map(|obj| obj.as_float().ok()).collect()
}

fn number_at(operands: &[Object], index: usize) -> Option<f32> {
    operands.get(index).and_then(|obj| obj.as_float().ok())
}

impl XObjectPlacement {
    /// Bounding box with a top-left origin on a page whose top edge is at
    /// `top` and left edge at `left`.
    pub fn to_page_bbox(&self, left: f32, top: f32) -> BBox {
        BBox::from_corners(self.x0 - left, top - self.y1, self.x1 - left, top - self.y0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Content;
    use lopdf::{Stream, dictionary};

    fn interpret(doc: &Document, resources: &Dictionary, content: &[u8]) -> PageContent {
        let content = Content::decode(content).unwrap();
        Interpreter::new(doc, Some(resources)).run(&content.operations)
    }

    fn helvetica_resources() -> Dictionary {
        dictionary! {
            "Font" => dictionary! {
                "F1" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                },
            },
        }
    }

    #[test]
    fn matrices_compose_in_pdf_order() {
        let scale = Matrix::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0);
        let shift = Matrix::translate(10.0, 5.0);
        assert_eq!(scale.then(&shift).apply(1.0, 1.0), (12.0, 7.0));
        assert_eq!(shift.then(&scale).apply(1.0, 1.0), (22.0, 12.0));
    }

    #[test]
    fn positions_and_advances_simple_text() {
        let doc = Document::with_version("1.5");
        let out = interpret(&doc, &helvetica_resources(), b"BT /F1 10 Tf 72 700 Td (Hello) Tj ET");
        assert_eq!(out.spans.len(), 1);
        let span = &out.spans[0];
        assert_eq!(span.text, "Hello");
        assert_eq!(span.op_index, 3);
        assert_eq!(span.x0, 72.0);
        assert!((span.x1 - (72.0 + 22.78)).abs() < 0.01);
        assert_eq!(span.baseline, 700.0);
        assert_eq!(span.size, 10.0);
        assert!((span.adjustment + 2278.0).abs() < 0.5);
    }

    #[test]
    fn ctm_scales_font_size_and_position() {
        let doc = Document::with_version("1.5");
        let out = interpret(
            &doc,
            &helvetica_resources(),
            b"q 2 0 0 2 0 0 cm BT /F1 6 Tf 10 20 Td (A) Tj ET Q BT /F1 6 Tf 10 20 Td (B) Tj ET",
        );
        assert_eq!(out.spans[0].size, 12.0);
        assert_eq!((out.spans[0].x0, out.spans[0].baseline), (20.0, 40.0));
        assert_eq!((out.spans[1].x0, out.spans[1].baseline), (10.0, 20.0));
    }

    #[test]
    fn tj_arrays_insert_spaces_for_wide_gaps() {
        let doc = Document::with_version("1.5");
        let out = interpret(&doc, &helvetica_resources(), b"BT /F1 10 Tf 0 0 Td [(Hel) -20 (lo) -400 (world)] TJ ET");
        assert_eq!(out.spans[0].text, "Hello world");
    }

    #[test]
    fn next_line_operators_use_leading() {
        let doc = Document::with_version("1.5");
        let out = interpret(&doc, &helvetica_resources(), b"BT /F1 10 Tf 14 TL 50 500 Td (one) Tj (two) ' ET");
        assert_eq!(out.spans[1].baseline, 486.0);
        assert_eq!(out.spans[1].x0, 50.0);
    }

    #[test]
    fn invisible_text_is_ignored() {
        let doc = Document::with_version("1.5");
        let out = interpret(&doc, &helvetica_resources(), b"BT 3 Tr /F1 10 Tf (hidden) Tj ET");
        assert!(out.spans.is_empty());
    }

    #[test]
    fn image_placements_follow_the_ctm() {
        let mut doc = Document::with_version("1.5");
        let image = Stream::new(
            dictionary! { "Type" => "XObject", "Subtype" => "Image", "Width" => 1, "Height" => 1 },
            vec![0],
        );
        let image_id = doc.add_object(image);
        let resources = dictionary! { "XObject" => dictionary! { "Im1" => image_id } };
        let out = interpret(&doc, &resources, b"q 100 0 0 50 10 20 cm /Im1 Do Q");
        let placement = &out.xobjects[0];
        assert_eq!(placement.kind, BlobKind::Image);
        assert_eq!((placement.x0, placement.y0, placement.x1, placement.y1), (10.0, 20.0, 110.0, 70.0));
        assert_eq!(placement.to_page_bbox(0.0, 100.0), BBox::new(10.0, 30.0, 100.0, 50.0));
    }
}
