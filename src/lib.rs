use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod adapters;
pub mod cancel;
pub mod data;
pub mod diagnostics;
pub mod error;
pub mod fit;
pub mod fonts;
pub mod layout;
pub mod logging;
pub mod model;
pub mod ocr;
pub mod orchestrator;
pub mod pipeline;
pub mod providers;
pub mod scripts;
pub mod settings;

pub use cancel::CancelToken;
pub use diagnostics::Diagnostics;
pub use error::EngineError;
pub use pipeline::{Engine, Job, JobOutput};
pub use providers::{Gemini, IdentityBackend, TranslationBackend};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data: Option<String>,
    pub data_mime: Option<String>,
    pub lang: String,
    pub source_lang: String,
    pub output: Option<String>,
    pub diagnostics: Option<String>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub fonts_dir: Option<String>,
    pub ocr_languages: Option<String>,
    pub no_translate: bool,
    pub show_languages: bool,
}

/// Runs one CLI invocation and returns the text to print.
pub async fn run(config: Config, cancel: CancelToken) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    apply_overrides(&mut settings, &config);

    if config.show_languages {
        let registry = scripts::ScriptRegistry::builtin()?;
        return Ok(format_languages(registry));
    }

    let data = config
        .data
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("--data is required"))?;
    let input_path = PathBuf::from(data);
    let bytes = fs::read(&input_path).with_context(|| format!("failed to read {}", input_path.display()))?;
    let format = data::resolve_format(
        config.data_mime.as_deref().unwrap_or("auto"),
        &bytes,
        Some(&input_path),
    )?;

    let backend: Arc<dyn TranslationBackend> = if config.no_translate {
        Arc::new(IdentityBackend)
    } else {
        let key = providers::resolve_key(config.key.as_deref())?;
        let mut gemini = Gemini::new(key);
        if let Some(model) = settings.provider.model.as_deref() {
            gemini = gemini.with_model(model);
        }
        Arc::new(gemini)
    };
    let ocr = Arc::new(ocr::TesseractOcr::new(
        settings.ocr.languages.clone(),
        settings.ocr.min_confidence,
    ));

    let output_path = config
        .output
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(&input_path, &config.lang, format.extension()));
    let engine = Engine::new(settings, backend, ocr)?;
    let job = Job {
        bytes,
        format,
        target_lang: config.lang.clone(),
        source_lang: Some(config.source_lang.clone()),
    };
    let output = engine
        .run(job, &cancel)
        .await
        .with_context(|| format!("failed to translate {}", input_path.display()))?;

    fs::write(&output_path, &output.bytes)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    if let Some(path) = config.diagnostics.as_deref() {
        let json = output.diagnostics.to_json_pretty()?;
        fs::write(path, json).with_context(|| format!("failed to write diagnostics: {}", path))?;
    }

    Ok(format_summary(&output_path, &output.diagnostics))
}

fn apply_overrides(settings: &mut settings::Settings, config: &Config) {
    if let Some(dir) = config.fonts_dir.as_deref().filter(|value| !value.trim().is_empty()) {
        settings.fonts.dir = PathBuf::from(dir);
    }
    if let Some(languages) = config.ocr_languages.as_deref().filter(|value| !value.trim().is_empty()) {
        settings.ocr.languages = languages.to_string();
    }
    if let Some(model) = config.model.as_deref().filter(|value| !value.trim().is_empty()) {
        settings.provider.model = Some(model.to_string());
    }
}

/// `report.pdf` translated to `ja` becomes `report.ja.pdf` beside the input.
fn default_output_path(input: &Path, lang: &str, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("translated");
    let lang = lang.trim().to_lowercase().replace(['/', '\\', ' '], "_");
    input.with_file_name(format!("{}.{}.{}", stem, lang, extension))
}

fn format_languages(registry: &scripts::ScriptRegistry) -> String {
    registry
        .profiles()
        .iter()
        .map(|profile| {
            let direction = if profile.rtl { "rtl" } else { "ltr" };
            format!(
                "{}\t{}\t{}\t{}",
                profile.id,
                profile.script,
                direction,
                profile.languages.join(",")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_summary(path: &Path, diagnostics: &Diagnostics) -> String {
    if diagnostics.no_translatable_content {
        return format!("{}: no translatable content, copied unchanged", path.display());
    }
    let mut summary = format!(
        "{}: {} of {} unit(s) translated",
        path.display(),
        diagnostics.translated,
        diagnostics.units
    );
    let mut flags = Vec::new();
    if diagnostics.failed > 0 {
        flags.push(format!("failed={}", diagnostics.failed));
    }
    if diagnostics.shrunk > 0 {
        flags.push(format!("shrunk={}", diagnostics.shrunk));
    }
    if diagnostics.overflowed > 0 {
        flags.push(format!("overflowed={}", diagnostics.overflowed));
    }
    if diagnostics.skipped > 0 {
        flags.push(format!("skipped={}", diagnostics.skipped));
    }
    if !flags.is_empty() {
        summary.push_str(&format!(" ({})", flags.join(", ")));
    }
    summary
}
