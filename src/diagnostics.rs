use serde::Serialize;

use crate::fit::FitQuality;
use crate::model::{Degradation, Document};

/// Machine-readable summary of one job: what was translated, what degraded
/// and why.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub format: String,
    pub target_language: String,
    pub profile: String,
    pub pages: usize,
    pub units: usize,
    pub translated: usize,
    pub failed: usize,
    pub skipped: usize,
    pub shrunk: usize,
    pub overflowed: usize,
    pub no_translatable_content: bool,
    pub degradations: Vec<UnitDiagnostic>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitDiagnostic {
    pub page: usize,
    pub unit: usize,
    pub source: String,
    #[serde(flatten)]
    pub degradation: Degradation,
}

const SOURCE_PREVIEW_CHARS: usize = 60;

impl Diagnostics {
    pub fn from_document(document: &Document, target_language: &str, profile: &str) -> Self {
        let mut diagnostics = Self {
            format: document.format.to_string(),
            target_language: target_language.to_string(),
            profile: profile.to_string(),
            pages: document.pages.len(),
            units: document.unit_count(),
            translated: 0,
            failed: 0,
            skipped: 0,
            shrunk: 0,
            overflowed: 0,
            no_translatable_content: document.unit_count() == 0,
            degradations: Vec::new(),
            notes: document.notes.clone(),
        };

        for page in &document.pages {
            for (index, unit) in page.units.iter().enumerate() {
                if unit.translation_failed() {
                    diagnostics.failed += 1;
                } else if unit.placement().is_some() {
                    diagnostics.translated += 1;
                }
                match unit.fit_quality() {
                    Some(FitQuality::Shrunk) => diagnostics.shrunk += 1,
                    Some(quality) if quality.is_overflow() => diagnostics.overflowed += 1,
                    _ => {}
                }
                for degradation in &unit.degradations {
                    if matches!(degradation, Degradation::SkippedDegenerateBox { .. }) {
                        diagnostics.skipped += 1;
                    }
                    diagnostics.degradations.push(UnitDiagnostic {
                        page: page.index,
                        unit: index,
                        source: preview(&unit.source),
                        degradation: degradation.clone(),
                    });
                }
            }
        }
        diagnostics
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn preview(source: &str) -> String {
    let mut chars = source.chars();
    let head: String = chars.by_ref().take(SOURCE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}
