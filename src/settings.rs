use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::fit::{FitPolicy, OverflowPolicy};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub fonts: FontSettings,
    pub fit: FitPolicy,
    pub translation: TranslationSettings,
    pub render: RenderSettings,
    pub ocr: OcrSettings,
    pub provider: ProviderSettings,
}

#[derive(Debug, Clone)]
pub struct FontSettings {
    pub dir: PathBuf,
    pub default_profile: String,
    pub system_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct TranslationSettings {
    pub batch_size: usize,
    pub concurrency: usize,
    pub max_retries: usize,
    pub retry_base_delay: Duration,
    pub timeout: Duration,
    pub protect_technical: bool,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub workers: usize,
    pub text_color: String,
    pub fill_color: String,
    pub pdf_background: bool,
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub languages: String,
    pub min_confidence: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub model: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fonts: FontSettings {
                dir: PathBuf::from("fonts"),
                default_profile: "latin".to_string(),
                system_fallback: true,
            },
            fit: FitPolicy::default(),
            translation: TranslationSettings {
                batch_size: 15,
                concurrency: 4,
                max_retries: 3,
                retry_base_delay: Duration::from_millis(500),
                timeout: Duration::from_secs(60),
                protect_technical: true,
            },
            render: RenderSettings {
                workers: 0,
                text_color: "#000000".to_string(),
                fill_color: "#ffffff".to_string(),
                pdf_background: false,
            },
            ocr: OcrSettings {
                languages: "eng".to_string(),
                min_confidence: 30.0,
            },
            provider: ProviderSettings::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    fonts: Option<FontsSection>,
    fit: Option<FitSection>,
    translation: Option<TranslationSection>,
    render: Option<RenderSection>,
    ocr: Option<OcrSection>,
    provider: Option<ProviderSection>,
}

#[derive(Debug, Default, Deserialize)]
struct FontsSection {
    dir: Option<String>,
    default_profile: Option<String>,
    system_fallback: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct FitSection {
    line_height: Option<f32>,
    min_font_size: Option<f32>,
    step: Option<f32>,
    default_font_size: Option<f32>,
    overflow: Option<String>,
    ellipsis: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSection {
    batch_size: Option<usize>,
    concurrency: Option<usize>,
    max_retries: Option<usize>,
    retry_base_delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
    protect_technical: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSection {
    workers: Option<usize>,
    text_color: Option<String>,
    fill_color: Option<String>,
    pdf_background: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSection {
    languages: Option<String>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderSection {
    model: Option<String>,
}

/// Loads the embedded defaults, then every settings file that exists, in
/// increasing priority. `extra_path` must exist when given.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::from_toml_str(DEFAULT_SETTINGS_TOML)
        .with_context(|| "failed to parse embedded settings")?;
    ensure_home_settings_file()?;

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    /// Built-in defaults overridden by a single TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let parsed: SettingsFile = toml::from_str(content)?;
        let mut settings = Settings::default();
        settings.merge(parsed);
        Ok(settings)
    }

    pub fn worker_count(&self) -> usize {
        if self.render.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.render.workers
        }
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(fonts) = incoming.fonts {
            if let Some(dir) = non_blank(fonts.dir) {
                self.fonts.dir = PathBuf::from(dir);
            }
            if let Some(profile) = non_blank(fonts.default_profile) {
                self.fonts.default_profile = profile;
            }
            if let Some(fallback) = fonts.system_fallback {
                self.fonts.system_fallback = fallback;
            }
        }
        if let Some(fit) = incoming.fit {
            if let Some(value) = positive(fit.line_height) {
                self.fit.line_height = value;
            }
            if let Some(value) = positive(fit.min_font_size) {
                self.fit.min_font_size = value;
            }
            if let Some(value) = positive(fit.step) {
                self.fit.step = value;
            }
            if let Some(value) = positive(fit.default_font_size) {
                self.fit.default_font_size = value;
            }
            if let Some(value) = non_blank(fit.overflow) {
                match OverflowPolicy::parse(&value) {
                    Some(policy) => self.fit.overflow = policy,
                    None => warn!("ignoring unknown overflow policy '{}'", value),
                }
            }
            if let Some(value) = fit.ellipsis {
                self.fit.ellipsis = value;
            }
        }
        if let Some(translation) = incoming.translation {
            if let Some(value) = translation.batch_size.filter(|value| *value > 0) {
                self.translation.batch_size = value;
            }
            if let Some(value) = translation.concurrency.filter(|value| *value > 0) {
                self.translation.concurrency = value;
            }
            if let Some(value) = translation.max_retries {
                self.translation.max_retries = value;
            }
            if let Some(value) = translation.retry_base_delay_ms.filter(|value| *value > 0) {
                self.translation.retry_base_delay = Duration::from_millis(value);
            }
            if let Some(value) = translation.timeout_secs.filter(|value| *value > 0) {
                self.translation.timeout = Duration::from_secs(value);
            }
            if let Some(value) = translation.protect_technical {
                self.translation.protect_technical = value;
            }
        }
        if let Some(render) = incoming.render {
            if let Some(value) = render.workers {
                self.render.workers = value;
            }
            if let Some(color) = non_blank(render.text_color) {
                self.render.text_color = color;
            }
            if let Some(color) = non_blank(render.fill_color) {
                self.render.fill_color = color;
            }
            if let Some(value) = render.pdf_background {
                self.render.pdf_background = value;
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = non_blank(ocr.languages) {
                self.ocr.languages = languages;
            }
            if let Some(value) = ocr.min_confidence.filter(|value| *value >= 0.0) {
                self.ocr.min_confidence = value;
            }
        }
        if let Some(provider) = incoming.provider {
            if let Some(model) = non_blank(provider.model) {
                self.provider.model = Some(model);
            }
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn positive(value: Option<f32>) -> Option<f32> {
    value.filter(|value| *value > 0.0)
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".layout-translator"))
        }
    })
}
