//! Reading and rewriting the text of one `w:p` element.

use super::xml::{XmlElement, XmlNode};
use crate::model::{Alignment, split_bold_markers};

/// Elements whose runs belong to the enclosing paragraph's text.
const RUN_CONTAINERS: [&str; 7] = [
    "w:hyperlink",
    "w:ins",
    "w:smartTag",
    "w:fldSimple",
    "w:sdt",
    "w:sdtContent",
    "w:customXml",
];

/// Run children that carry text. Everything else in a run (drawings, field
/// characters, footnote references) is kept on rewrite.
const TEXT_PIECES: [&str; 5] = ["w:t", "w:tab", "w:br", "w:cr", "w:noBreakHyphen"];

/// `w:val` values that switch a toggle property off.
const OFF_VALUES: [&str; 3] = ["0", "false", "off"];

#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphText {
    /// Paragraph text, with `**` around bold runs when bold is mixed.
    pub text: String,
    pub bold: bool,
    pub italic: bool,
    /// Font size of the first text run, in points.
    pub font_size: Option<f32>,
    pub alignment: Alignment,
    pub is_heading: bool,
}

pub fn read_paragraph(paragraph: &XmlElement) -> ParagraphText {
    let runs = text_runs(paragraph);
    let mut segments: Vec<(String, bool, bool)> = Vec::new();
    for run in &runs {
        let text = run_text(run);
        if text.is_empty() {
            continue;
        }
        let properties = run.child("w:rPr");
        let bold = toggle(properties, "w:b");
        let italic = toggle(properties, "w:i");
        match segments.last_mut() {
            Some(last) if last.1 == bold || text.trim().is_empty() => {
                last.0.push_str(&text);
                last.2 &= italic || text.trim().is_empty();
            }
            _ => segments.push((text, bold, italic)),
        }
    }

    let visible: Vec<&(String, bool, bool)> = segments.iter().filter(|segment| !segment.0.trim().is_empty()).collect();
    let all_bold = !visible.is_empty() && visible.iter().all(|segment| segment.1);
    let mixed = visible.iter().any(|segment| segment.1) && !all_bold;
    let text = if mixed {
        segments
            .iter()
            .map(|(text, bold, _)| if *bold { wrap_bold(text) } else { text.clone() })
            .collect::<String>()
    } else {
        segments.iter().map(|segment| segment.0.as_str()).collect()
    };

    let properties = paragraph.child("w:pPr");
    let style = properties
        .and_then(|props| props.child("w:pStyle"))
        .and_then(|style| style.attr("w:val"))
        .unwrap_or_default()
        .to_ascii_lowercase();

    ParagraphText {
        text: text.trim().to_string(),
        bold: all_bold,
        italic: !visible.is_empty() && visible.iter().all(|segment| segment.2),
        font_size: runs
            .iter()
            .find(|run| !run_text(run).trim().is_empty())
            .and_then(|run| run.child("w:rPr"))
            .and_then(|props| props.child("w:sz"))
            .and_then(|size| size.attr("w:val"))
            .and_then(|value| value.parse::<f32>().ok())
            .and_then(points_from_half_points),
        alignment: properties
            .and_then(|props| props.child("w:jc"))
            .and_then(|jc| jc.attr("w:val"))
            .map(parse_alignment)
            .unwrap_or_default(),
        is_heading: style.starts_with("heading") || style == "title",
    }
}

/// `w:sz` is in half-points. Zero or negative sizes are ignored so the
/// document default applies.
pub(super) fn points_from_half_points(half_points: f32) -> Option<f32> {
    (half_points.is_finite() && half_points > 0.0).then_some(half_points / 2.0)
}

/// Keeps whitespace outside the markers so `**` always hugs visible text.
fn wrap_bold(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return text.to_string();
    }
    let start = text.len() - text.trim_start().len();
    let end = start + trimmed.len();
    format!("{}**{}**{}", &text[..start], trimmed, &text[end..])
}

fn parse_alignment(value: &str) -> Alignment {
    match value {
        "center" => Alignment::Center,
        "right" | "end" => Alignment::Right,
        "both" | "distribute" | "justify" => Alignment::Justify,
        _ => Alignment::Left,
    }
}

fn toggle(properties: Option<&XmlElement>, name: &str) -> bool {
    properties
        .and_then(|props| props.child(name))
        .is_some_and(|element| element.attr("w:val").is_none_or(|value| !OFF_VALUES.contains(&value)))
}

/// Text runs of the paragraph in document order, looking through hyperlinks
/// and other run containers but not into nested paragraphs.
fn text_runs(paragraph: &XmlElement) -> Vec<&XmlElement> {
    let mut runs = Vec::new();
    collect_runs(paragraph, &mut runs);
    runs
}

fn collect_runs<'a>(element: &'a XmlElement, runs: &mut Vec<&'a XmlElement>) {
    for child in element.elements() {
        if child.name == "w:r" {
            runs.push(child);
        } else if RUN_CONTAINERS.contains(&child.name.as_str()) {
            collect_runs(child, runs);
        }
    }
}

fn run_text(run: &XmlElement) -> String {
    let mut text = String::new();
    for piece in run.elements() {
        match piece.name.as_str() {
            "w:t" => text.push_str(&piece.text()),
            "w:tab" => text.push('\t'),
            "w:br" | "w:cr" => text.push('\n'),
            "w:noBreakHyphen" => text.push('-'),
            _ => {}
        }
    }
    text
}

/// Replaces the paragraph's text with `translation`, split into runs on
/// `**` markers. Paragraph properties and non-text content stay in place;
/// the new runs take the position of the first original text run and copy
/// its run properties. `font_family`, when given, is set on every new run.
pub fn rewrite_paragraph(paragraph: &mut XmlElement, translation: &str, bold: bool, font_family: Option<&str>) {
    let template = text_runs(paragraph)
        .into_iter()
        .find(|run| !run_text(run).is_empty())
        .and_then(|run| run.child("w:rPr"))
        .cloned();

    let mut new_runs = Some(
        split_bold_markers(translation)
            .into_iter()
            .map(|(segment, marked)| XmlNode::Element(build_run(&segment, marked || bold, template.as_ref(), font_family)))
            .collect::<Vec<_>>(),
    );

    let mut children = Vec::with_capacity(paragraph.children.len());
    for node in std::mem::take(&mut paragraph.children) {
        let XmlNode::Element(mut element) = node else {
            children.push(node);
            continue;
        };
        let holds_text = element.name == "w:r" || RUN_CONTAINERS.contains(&element.name.as_str());
        if holds_text && strip_text(&mut element) {
            if let Some(runs) = new_runs.take() {
                children.extend(runs);
            }
            if !is_hollow(&element) {
                children.push(XmlNode::Element(element));
            }
        } else {
            children.push(XmlNode::Element(element));
        }
    }
    if let Some(runs) = new_runs {
        children.extend(runs);
    }
    paragraph.children = children;
}

/// Removes text pieces from a run or container. Returns whether any text
/// was removed.
fn strip_text(element: &mut XmlElement) -> bool {
    if element.name == "w:r" {
        let before = element.children.len();
        element
            .children
            .retain(|node| !matches!(node, XmlNode::Element(piece) if TEXT_PIECES.contains(&piece.name.as_str())));
        return element.children.len() != before;
    }
    let mut removed = false;
    for child in element.children.iter_mut() {
        if let XmlNode::Element(child) = child {
            if child.name == "w:r" || RUN_CONTAINERS.contains(&child.name.as_str()) {
                removed |= strip_text(child);
            }
        }
    }
    if removed {
        element
            .children
            .retain(|node| !matches!(node, XmlNode::Element(child) if is_hollow(child)));
    }
    removed
}

/// A run with nothing but properties, or a container with no runs left.
fn is_hollow(element: &XmlElement) -> bool {
    if element.name == "w:r" {
        return element.elements().all(|child| child.name == "w:rPr");
    }
    if RUN_CONTAINERS.contains(&element.name.as_str()) {
        return element.elements().all(|child| child.name.ends_with("Pr"));
    }
    false
}

fn build_run(text: &str, bold: bool, template: Option<&XmlElement>, font_family: Option<&str>) -> XmlElement {
    let mut properties = template.cloned().unwrap_or_else(|| XmlElement::new("w:rPr"));
    set_bold(&mut properties, bold);
    if let Some(family) = font_family {
        set_fonts(&mut properties, family);
    }

    let mut run = XmlElement::new("w:r");
    if properties.elements().next().is_some() {
        run = run.with_child(properties);
    }
    for (index, line) in text.split('\n').enumerate() {
        if index > 0 {
            run = run.with_child(XmlElement::new("w:br"));
        }
        for (piece_index, piece) in line.split('\t').enumerate() {
            if piece_index > 0 {
                run = run.with_child(XmlElement::new("w:tab"));
            }
            if piece.is_empty() {
                continue;
            }
            let mut t = XmlElement::new("w:t").with_text(piece);
            if piece.starts_with(char::is_whitespace) || piece.ends_with(char::is_whitespace) {
                t.set_attr("xml:space", "preserve");
            }
            run = run.with_child(t);
        }
    }
    run
}

/// Position after `w:rStyle` and `w:rFonts`, where `w:b` belongs.
fn after_leading(properties: &XmlElement, leading: &[&str]) -> usize {
    properties
        .children
        .iter()
        .position(|node| match node {
            XmlNode::Element(element) => !leading.contains(&element.name.as_str()),
            _ => false,
        })
        .unwrap_or(properties.children.len())
}

fn set_bold(properties: &mut XmlElement, bold: bool) {
    properties
        .children
        .retain(|node| !matches!(node, XmlNode::Element(element) if element.name == "w:b" || element.name == "w:bCs"));
    if bold {
        let position = after_leading(properties, &["w:rStyle", "w:rFonts"]);
        properties
            .children
            .insert(position, XmlNode::Element(XmlElement::new("w:b")));
    }
}

fn set_fonts(properties: &mut XmlElement, family: &str) {
    if properties.child("w:rFonts").is_none() {
        let position = after_leading(properties, &["w:rStyle"]);
        properties
            .children
            .insert(position, XmlNode::Element(XmlElement::new("w:rFonts")));
    }
    if let Some(fonts) = properties.child_mut("w:rFonts") {
        fonts.attrs.retain(|(key, _)| !key.ends_with("Theme") && key != "w:cstheme");
        for key in ["w:ascii", "w:hAnsi", "w:eastAsia", "w:cs"] {
            fonts.set_attr(key, family);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::xml::XmlDocument;
    use super::*;

    fn paragraph(xml: &str) -> XmlElement {
        XmlDocument::parse(xml.as_bytes()).unwrap().root().unwrap().clone()
    }

    fn serialize(element: &XmlElement) -> String {
        let doc = XmlDocument {
            nodes: vec![XmlNode::Element(element.clone())],
        };
        String::from_utf8(doc.to_bytes().unwrap()).unwrap()
    }

    const MIXED: &str = r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:sz w:val="24"/></w:rPr><w:t xml:space="preserve">Press </w:t></w:r><w:r><w:rPr><w:b/><w:sz w:val="24"/></w:rPr><w:t>Save</w:t></w:r><w:r><w:t xml:space="preserve"> now</w:t></w:r></w:p>"#;

    #[test]
    fn mixed_bold_runs_become_markers() {
        let text = read_paragraph(&paragraph(MIXED));
        assert_eq!(text.text, "Press **Save** now");
        assert!(!text.bold);
        assert_eq!(text.font_size, Some(12.0));
        assert_eq!(text.alignment, Alignment::Center);
    }

    #[test]
    fn zero_size_runs_fall_back_to_the_default() {
        let text = read_paragraph(&paragraph(
            r#"<w:p><w:r><w:rPr><w:sz w:val="0"/></w:rPr><w:t>Tiny</w:t></w:r></w:p>"#,
        ));
        assert_eq!(text.font_size, None);
        assert_eq!(points_from_half_points(-4.0), None);
        assert_eq!(points_from_half_points(21.0), Some(10.5));
    }

    #[test]
    fn fully_bold_paragraph_sets_the_flag() {
        let text = read_paragraph(&paragraph(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:rPr><w:b/></w:rPr><w:t>Title</w:t></w:r><w:r><w:rPr><w:b w:val="1"/></w:rPr><w:t xml:space="preserve"> text</w:t></w:r></w:p>"#,
        ));
        assert_eq!(text.text, "Title text");
        assert!(text.bold);
        assert!(text.is_heading);
    }

    #[test]
    fn explicit_off_values_are_not_bold() {
        let text = read_paragraph(&paragraph(r#"<w:p><w:r><w:rPr><w:b w:val="false"/></w:rPr><w:t>plain</w:t></w:r></w:p>"#));
        assert!(!text.bold);
    }

    #[test]
    fn hyperlinks_contribute_text_but_nested_paragraphs_do_not() {
        let text = read_paragraph(&paragraph(
            r#"<w:p><w:hyperlink><w:r><w:t>link</w:t></w:r></w:hyperlink><w:r><w:drawing><w:txbxContent><w:p><w:r><w:t>inner</w:t></w:r></w:p></w:txbxContent></w:drawing></w:r><w:r><w:tab/><w:t>after</w:t></w:r></w:p>"#,
        ));
        assert_eq!(text.text, "link\tafter");
    }

    #[test]
    fn rewrite_splits_markers_and_keeps_non_text_content() {
        let mut p = paragraph(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:i/></w:rPr><w:t>Old</w:t></w:r><w:r><w:drawing/></w:r><w:r><w:t>text</w:t></w:r></w:p>"#,
        );
        rewrite_paragraph(&mut p, "Appuyez sur **Enregistrer**", false, Some("Noto Sans"));
        insta::assert_snapshot!(serialize(&p), @r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:rFonts w:ascii="Noto Sans" w:hAnsi="Noto Sans" w:eastAsia="Noto Sans" w:cs="Noto Sans"/><w:i/></w:rPr><w:t xml:space="preserve">Appuyez sur </w:t></w:r><w:r><w:rPr><w:rFonts w:ascii="Noto Sans" w:hAnsi="Noto Sans" w:eastAsia="Noto Sans" w:cs="Noto Sans"/><w:b/><w:i/></w:rPr><w:t>Enregistrer</w:t></w:r><w:r><w:drawing/></w:r></w:p>"#);
    }

    #[test]
    fn whole_paragraph_bold_survives_rewrite() {
        let mut p = paragraph(r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Title</w:t></w:r></w:p>"#);
        rewrite_paragraph(&mut p, "Titre", true, None);
        assert_eq!(serialize(&p), r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Titre</w:t></w:r></w:p>"#);
    }

    #[test]
    fn emptied_hyperlinks_are_removed() {
        let mut p = paragraph(r#"<w:p><w:hyperlink r:id="rId1"><w:r><w:t>here</w:t></w:r></w:hyperlink></w:p>"#);
        rewrite_paragraph(&mut p, "ici", false, None);
        assert_eq!(serialize(&p), r#"<w:p><w:r><w:t>ici</w:t></w:r></w:p>"#);
    }

    #[test]
    fn line_breaks_and_tabs_become_elements() {
        let run = build_run("a\tb\nc", false, None, None);
        assert_eq!(
            serialize(&run),
            r#"<w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t></w:r>"#
        );
    }
}
