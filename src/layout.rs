//! Per-unit font resolution and fitting, run page-parallel before an adapter
//! renders the document.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::fit::{FitPolicy, FitQuality, fit};
use crate::fonts::{FontResolver, FontStyle};
use crate::model::{Degradation, Document, Page, Placement, TextUnit, strip_bold_markers};
use crate::scripts::ScriptProfile;

/// Attaches a [`Placement`] to every unit that has a translation to render.
///
/// Pages have no shared state apart from the font cache, so they are laid
/// out on a pool of `workers` threads.
pub fn layout_document(
    document: &mut Document,
    profile: &ScriptProfile,
    resolver: &FontResolver,
    policy: &FitPolicy,
    workers: usize,
) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|err| EngineError::Render(format!("failed to start layout workers: {}", err)))?;

    pool.install(|| {
        document
            .pages
            .par_iter_mut()
            .for_each(|page| layout_page(page, profile, resolver, policy));
    });

    let placed = document
        .units()
        .filter(|unit| unit.placement().is_some())
        .count();
    info!(
        "laid out {} of {} unit(s) with profile '{}'",
        placed,
        document.unit_count(),
        profile.id
    );
    Ok(())
}

pub fn layout_page(page: &mut Page, profile: &ScriptProfile, resolver: &FontResolver, policy: &FitPolicy) {
    let (width, height) = (page.width, page.height);
    for unit in &mut page.units {
        layout_unit(unit, width, height, profile, resolver, policy);
    }
}

fn layout_unit(
    unit: &mut TextUnit,
    page_width: f32,
    page_height: f32,
    profile: &ScriptProfile,
    resolver: &FontResolver,
    policy: &FitPolicy,
) {
    let Some(text) = unit.replacement().map(strip_bold_markers) else {
        return;
    };

    let bbox = unit.bbox.clamp_to(page_width, page_height);
    if unit.bbox.is_degenerate() || bbox.is_degenerate() {
        debug!(
            "skipping unit with degenerate box {:.2}x{:.2}: {:?}",
            unit.bbox.width, unit.bbox.height, unit.source
        );
        unit.degrade(Degradation::SkippedDegenerateBox {
            width: unit.bbox.width,
            height: unit.bbox.height,
        });
        return;
    }
    unit.bbox = bbox;

    let resolved = resolver.resolve(profile, FontStyle::from_flags(unit.style));
    if let Some(fallback) = resolved.fallback {
        unit.degrade(fallback);
    }
    if let Some(coverage) = FontResolver::check_coverage(&resolved.asset, &text) {
        debug!("font {} lacks glyphs for {:?}", resolved.asset.family, text);
        unit.degrade(coverage);
    }

    let base_size = if unit.font_size > 0.0 {
        unit.font_size
    } else {
        policy.default_font_size
    };
    let result = fit(&text, &bbox, &resolved.asset, base_size, None, policy);
    match result.quality {
        FitQuality::OverflowedTruncated => unit.degrade(Degradation::OverflowedTruncated {
            font_size: result.font_size,
        }),
        FitQuality::OverflowedClipped => unit.degrade(Degradation::OverflowedClipped {
            font_size: result.font_size,
        }),
        FitQuality::Exact | FitQuality::Shrunk => {}
    }

    unit.set_placement(Placement {
        font: resolved.asset,
        fit: result,
    });
}

/// Whether a unit is in a state the renderers should replace.
pub fn is_renderable(unit: &TextUnit) -> bool {
    unit.placement().is_some() && !unit.translation_failed()
}
