use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use resvg::render;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::{debug, info};
use usvg::{Options, Tree, fontdb};

use super::image_format;
use crate::adapters::{RenderContext, parse_hex_color};
use crate::data::{DocumentFormat, ImageKind};
use crate::error::{EngineError, Result};
use crate::fit::FitQuality;
use crate::layout::is_renderable;
use crate::model::{Alignment, Document, TextUnit};

/// Families tried for the builtin Helvetica metrics.
const BUILTIN_FAMILIES: &str = "Helvetica, Arial, 'Liberation Sans', 'DejaVu Sans', sans-serif";

struct OverlayStyle {
    text_color: String,
    fill_color: String,
}

pub(super) fn render_overlay(document: &Document, kind: ImageKind, context: &RenderContext<'_>) -> Result<Vec<u8>> {
    let style = OverlayStyle {
        text_color: svg_color(parse_hex_color(&context.settings.render.text_color)),
        fill_color: svg_color(parse_hex_color(&context.settings.render.fill_color)),
    };
    let Some(page) = document.pages.first() else {
        return Ok(document.original.to_vec());
    };
    let units: Vec<&TextUnit> = page.units.iter().filter(|unit| is_renderable(unit)).collect();
    if units.is_empty() {
        return Ok(document.original.to_vec());
    }

    let format = DocumentFormat::Image(kind);
    let svg = build_svg(
        &document.original,
        format.mime(),
        page.width,
        page.height,
        &units,
        &style,
    );

    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let mut loaded = HashSet::new();
    for unit in &units {
        let Some(placement) = unit.placement() else {
            continue;
        };
        if let Some(data) = placement.font.data() {
            if loaded.insert(Arc::as_ptr(data) as usize) {
                db.load_font_data(data.to_vec());
            }
        }
    }
    debug!("overlay uses {} font file(s), {} face(s) available", loaded.len(), db.len());

    let out = rasterize(&svg, kind, db)?;
    info!("rendered {} overlay(s) onto {} image, {} bytes", units.len(), format, out.len());
    Ok(out)
}

fn build_svg(image: &[u8], mime: &str, width: f32, height: f32, units: &[&TextUnit], style: &OverlayStyle) -> String {
    let data_uri = format!("data:{};base64,{}", mime, BASE64.encode(image));
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));

    for (idx, unit) in units.iter().enumerate() {
        let Some(placement) = unit.placement() else {
            continue;
        };
        let fit = &placement.fit;
        let bbox = unit.bbox;
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}"/>"#,
            x = bbox.x,
            y = bbox.y,
            w = bbox.width,
            h = bbox.height,
            fill = style.fill_color
        ));

        let clip = if fit.quality == FitQuality::OverflowedClipped {
            let clip_id = format!("clip-{}", idx);
            svg.push_str(&format!(
                r#"<clipPath id="{id}"><rect x="{x}" y="{y}" width="{w}" height="{h}"/></clipPath>"#,
                id = clip_id,
                x = bbox.x,
                y = bbox.y,
                w = bbox.width,
                h = bbox.height
            ));
            format!(r#" clip-path="url(#{})""#, clip_id)
        } else {
            String::new()
        };

        let (x, anchor) = match unit.alignment {
            Alignment::Center => (bbox.x + bbox.width / 2.0, "middle"),
            Alignment::Right => (bbox.right(), "end"),
            Alignment::Left | Alignment::Justify => (bbox.x, "start"),
        };
        let family = if placement.font.is_builtin() {
            BUILTIN_FAMILIES.to_string()
        } else {
            format!("'{}'", escape_xml(&placement.font.family))
        };
        let weight = if placement.font.style.is_bold() { "bold" } else { "normal" };
        let font_style = if placement.font.style.is_italic() { "italic" } else { "normal" };
        let baseline = bbox.y + placement.font.ascent(fit.font_size);

        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-size="{size}" font-family="{family}" font-weight="{weight}" font-style="{font_style}" text-anchor="{anchor}" fill="{color}"{clip}>"#,
            y = baseline,
            size = fit.font_size,
            color = style.text_color,
        ));
        for (line_idx, line) in fit.lines.iter().enumerate() {
            let dy = if line_idx == 0 { 0.0 } else { fit.line_height };
            svg.push_str(&format!(
                r#"<tspan x="{x}" dy="{dy}">{text}</tspan>"#,
                text = escape_xml(&line.text)
            ));
        }
        svg.push_str("</text>");
    }

    svg.push_str("</svg>");
    svg
}

fn rasterize(svg: &str, kind: ImageKind, db: fontdb::Database) -> Result<Vec<u8>> {
    let render_error = |message: String| EngineError::Render(message);
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).map_err(|err| render_error(format!("failed to parse SVG: {}", err)))?;
    let size = tree.size().to_int_size();
    let mut pixmap = Pixmap::new(size.width(), size.height()).ok_or_else(|| render_error("empty SVG size".into()))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);

    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| render_error("failed to build image buffer from SVG".into()))?;
    let image = match kind {
        // JPEG has no alpha channel.
        ImageKind::Jpeg => image::DynamicImage::ImageRgb8(image::DynamicImage::ImageRgba8(image).to_rgb8()),
        ImageKind::Png => image::DynamicImage::ImageRgba8(image),
    };
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image_format(kind))
        .map_err(|err| render_error(format!("failed to encode image: {}", err)))?;
    Ok(bytes)
}

fn svg_color([r, g, b]: [f32; 3]) -> String {
    let channel = |value: f32| (value * 255.0).round().clamp(0.0, 255.0) as u8;
    format!("#{:02x}{:02x}{:02x}", channel(r), channel(g), channel(b))
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::super::ImageAdapter;
    use super::super::test_support::{ScriptedOcr, line, solid_image};
    use super::*;
    use crate::adapters::DocumentAdapter;
    use crate::fit::OverflowPolicy;
    use crate::fonts::FontResolver;
    use crate::model::BBox;
    use crate::scripts::ScriptRegistry;
    use crate::settings::Settings;
    use tempfile::tempdir;

    fn translated(kind: ImageKind, translation: &str, bbox: BBox) -> (ImageAdapter, Document) {
        let format = image_format(kind);
        let adapter = ImageAdapter::new(kind, Arc::new(ScriptedOcr(Some(vec![line("Hello", bbox)]))));
        let mut document = adapter.extract(solid_image(200, 100, format)).unwrap();
        document.pages[0].units[0].set_translation(translation.to_string());
        (adapter, document)
    }

    #[test]
    fn overlay_covers_the_region_and_keeps_the_rest() {
        let dir = tempdir().unwrap();
        let settings = Settings::default();
        let profile = ScriptRegistry::builtin().unwrap().default_profile();
        let resolver = FontResolver::new(dir.path(), false);
        let context = RenderContext {
            settings: &settings,
            profile,
            resolver: &resolver,
        };
        let (adapter, mut document) = translated(ImageKind::Png, "Hi", BBox::new(10.0, 10.0, 150.0, 40.0));
        let output = adapter.reconstruct(&mut document, &context).unwrap();

        let image = image::load_from_memory(&output).unwrap().to_rgb8();
        assert_eq!(image.dimensions(), (200, 100));
        assert_eq!(image.get_pixel(150, 45).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(190, 90).0, [200, 0, 0]);
    }

    #[test]
    fn jpeg_inputs_stay_jpeg() {
        let dir = tempdir().unwrap();
        let settings = Settings::default();
        let profile = ScriptRegistry::builtin().unwrap().default_profile();
        let resolver = FontResolver::new(dir.path(), false);
        let context = RenderContext {
            settings: &settings,
            profile,
            resolver: &resolver,
        };
        let (adapter, mut document) = translated(ImageKind::Jpeg, "Salut", BBox::new(0.0, 0.0, 100.0, 30.0));
        let output = adapter.reconstruct(&mut document, &context).unwrap();
        assert_eq!(image::guess_format(&output).unwrap(), image::ImageFormat::Jpeg);
    }

    #[test]
    fn untranslated_images_are_returned_unchanged() {
        let bytes = solid_image(20, 20, image::ImageFormat::Png);
        let adapter = ImageAdapter::new(ImageKind::Png, Arc::new(ScriptedOcr(Some(Vec::new()))));
        let document = adapter.extract(bytes.clone()).unwrap();
        let settings = Settings::default();
        let profile = ScriptRegistry::builtin().unwrap().default_profile();
        let resolver = FontResolver::new(tempdir().unwrap().path(), false);
        let context = RenderContext {
            settings: &settings,
            profile,
            resolver: &resolver,
        };
        assert_eq!(adapter.render(&document, &context).unwrap(), bytes);
    }

    #[test]
    fn svg_escapes_text_and_leaves_fitting_text_unclipped() {
        let dir = tempdir().unwrap();
        let settings = Settings::default();
        let profile = ScriptRegistry::builtin().unwrap().default_profile();
        let resolver = FontResolver::new(dir.path(), false);
        let (_, mut document) = translated(ImageKind::Png, "a < b & c", BBox::new(10.0, 10.0, 120.0, 30.0));
        crate::layout::layout_document(&mut document, profile, &resolver, &settings.fit, 1).unwrap();

        let style = OverlayStyle {
            text_color: svg_color([0.0, 0.0, 0.0]),
            fill_color: svg_color([1.0, 1.0, 1.0]),
        };
        let units: Vec<&TextUnit> = document.pages[0].units.iter().collect();
        let svg = build_svg(b"png", "image/png", 200.0, 100.0, &units, &style);
        assert!(svg.contains(r##"<rect x="10" y="10" width="120" height="30" fill="#ffffff"/>"##));
        assert!(svg.contains(">a &lt; b &amp; c</tspan>"));
        assert!(svg.contains("data:image/png;base64,cG5n"));
        assert!(!svg.contains("clip-path"));
    }

    #[test]
    fn clipped_overflow_is_clipped_to_the_unit_box() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::default();
        settings.fit.overflow = OverflowPolicy::Clip;
        let profile = ScriptRegistry::builtin().unwrap().default_profile();
        let resolver = FontResolver::new(dir.path(), false);
        let (_, mut document) = translated(ImageKind::Png, &"word ".repeat(30), BBox::new(10.0, 10.0, 40.0, 6.0));
        crate::layout::layout_document(&mut document, profile, &resolver, &settings.fit, 1).unwrap();
        let unit = &document.pages[0].units[0];
        assert_eq!(unit.placement().unwrap().fit.quality, FitQuality::OverflowedClipped);

        let style = OverlayStyle {
            text_color: svg_color([0.0, 0.0, 0.0]),
            fill_color: svg_color([1.0, 1.0, 1.0]),
        };
        let svg = build_svg(b"png", "image/png", 200.0, 100.0, &[unit], &style);
        assert!(svg.contains(r#"<clipPath id="clip-0"><rect x="10" y="10" width="40" height="6"/></clipPath>"#));
        assert!(svg.contains(r#"clip-path="url(#clip-0)""#));
    }
}
