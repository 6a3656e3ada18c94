//! One translation job end to end: extract, translate, reconstruct.

use std::sync::Arc;
use tokio::task::{JoinError, spawn_blocking};
use tracing::{info, warn};

use crate::adapters::{DocumentAdapter, RenderContext, adapter_for};
use crate::cancel::CancelToken;
use crate::data::DocumentFormat;
use crate::diagnostics::Diagnostics;
use crate::error::{EngineError, Result};
use crate::fonts::FontResolver;
use crate::ocr::OcrEngine;
use crate::orchestrator::Orchestrator;
use crate::providers::TranslationBackend;
use crate::scripts::{ScriptProfile, ScriptRegistry};
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct Job {
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
    pub target_lang: String,
    /// `None` or `auto` lets the backend detect the source language.
    pub source_lang: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobOutput {
    /// Same container format as the input.
    pub bytes: Vec<u8>,
    pub diagnostics: Diagnostics,
}

/// Long-lived engine state shared by every job: settings, the script table
/// and the font cache.
pub struct Engine {
    settings: Arc<Settings>,
    registry: &'static ScriptRegistry,
    resolver: Arc<FontResolver>,
    orchestrator: Orchestrator,
    ocr: Arc<dyn OcrEngine>,
}

impl Engine {
    pub fn new(
        settings: Settings,
        backend: Arc<dyn TranslationBackend>,
        ocr: Arc<dyn OcrEngine>,
    ) -> anyhow::Result<Self> {
        let registry = ScriptRegistry::builtin()?;
        let resolver = Arc::new(FontResolver::from_settings(&settings.fonts));
        let orchestrator = Orchestrator::new(backend, settings.translation.clone());
        Ok(Self {
            settings: Arc::new(settings),
            registry,
            resolver,
            orchestrator,
            ocr,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &'static ScriptRegistry {
        self.registry
    }

    /// Runs a job to completion. Per-unit problems end up in the returned
    /// diagnostics; only unparseable input, a total translation outage or
    /// cancellation fail the job, and then no bytes are produced.
    pub async fn run(&self, job: Job, cancel: &CancelToken) -> Result<JobOutput> {
        let mut notes = Vec::new();
        let profile = self.profile_for(&job.target_lang, &mut notes);
        info!(
            "{} job into '{}' using the '{}' profile",
            job.format, job.target_lang, profile.id
        );

        let adapter: Arc<dyn DocumentAdapter> = Arc::from(adapter_for(job.format, Arc::clone(&self.ocr)));
        let extracting = Arc::clone(&adapter);
        let bytes = job.bytes;
        let mut document = spawn_blocking(move || extracting.extract(bytes))
            .await
            .map_err(worker_failed)??;
        document.notes.extend(notes);
        info!(
            "extracted {} unit(s) from {} page(s)",
            document.unit_count(),
            document.pages.len()
        );

        if document.unit_count() == 0 {
            info!("no translatable content; returning the input unchanged");
            let diagnostics = Diagnostics::from_document(&document, &job.target_lang, &profile.id);
            return Ok(JobOutput {
                bytes: document.original.to_vec(),
                diagnostics,
            });
        }

        let source_lang = job
            .source_lang
            .as_deref()
            .map(str::trim)
            .filter(|lang| !lang.is_empty() && !lang.eq_ignore_ascii_case("auto"));
        self.orchestrator
            .translate(&mut document, &job.target_lang, source_lang, cancel)
            .await?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let settings = Arc::clone(&self.settings);
        let resolver = Arc::clone(&self.resolver);
        let rendering = spawn_blocking(move || {
            let context = RenderContext {
                settings: &settings,
                profile,
                resolver: &resolver,
            };
            let output = adapter.reconstruct(&mut document, &context);
            (document, output)
        });
        // A cancelled render still finishes on its worker, but nothing of it
        // is returned.
        let (document, output) = tokio::select! {
            joined = rendering => joined.map_err(worker_failed)?,
            _ = cancel.cancelled() => {
                info!("job cancelled during reconstruction; discarding output");
                return Err(EngineError::Cancelled);
            }
        };
        let bytes = output?;

        let diagnostics = Diagnostics::from_document(&document, &job.target_lang, &profile.id);
        info!(
            "translated {} unit(s), {} failed, {} overflowed; wrote {} bytes",
            diagnostics.translated,
            diagnostics.failed,
            diagnostics.overflowed,
            bytes.len()
        );
        Ok(JobOutput { bytes, diagnostics })
    }

    fn profile_for(&self, language: &str, notes: &mut Vec<String>) -> &'static ScriptProfile {
        let registry: &'static ScriptRegistry = self.registry;
        match registry.resolve(language) {
            Ok(profile) => profile,
            Err(err) => {
                let fallback = registry.resolve_or_default(language, &self.settings.fonts.default_profile);
                notes.push(format!("{}; rendered with the '{}' profile", err, fallback.id));
                fallback
            }
        }
    }
}

fn worker_failed(err: JoinError) -> EngineError {
    warn!("worker task failed: {}", err);
    EngineError::Render(format!("worker task failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::image::test_support::{ScriptedOcr, line, solid_image};
    use crate::data::ImageKind;
    use crate::model::BBox;
    use crate::providers::IdentityBackend;

    fn engine(ocr: ScriptedOcr) -> Engine {
        let mut settings = Settings::default();
        settings.fonts.dir = std::env::temp_dir().join("layout-translator-no-fonts");
        settings.fonts.system_fallback = false;
        Engine::new(settings, Arc::new(IdentityBackend), Arc::new(ocr)).unwrap()
    }

    fn png_job(lang: &str) -> Job {
        Job {
            bytes: solid_image(120, 60, image::ImageFormat::Png),
            format: DocumentFormat::Image(ImageKind::Png),
            target_lang: lang.to_string(),
            source_lang: Some("auto".to_string()),
        }
    }

    #[tokio::test]
    async fn unknown_language_renders_with_the_default_profile() {
        let engine = engine(ScriptedOcr(Some(vec![line("Hello", BBox::new(5.0, 5.0, 100.0, 20.0))])));
        let output = engine.run(png_job("klingon"), &CancelToken::new()).await.unwrap();

        assert_eq!(output.diagnostics.profile, engine.registry().default_profile().id);
        assert_eq!(output.diagnostics.translated, 1);
        assert!(output.diagnostics.notes[0].starts_with("unknown language 'klingon'"));
        assert_eq!(image::guess_format(&output.bytes).unwrap(), image::ImageFormat::Png);
    }

    #[tokio::test]
    async fn images_without_text_come_back_unchanged() {
        let engine = engine(ScriptedOcr(Some(Vec::new())));
        let job = png_job("fr");
        let original = job.bytes.clone();
        let output = engine.run(job, &CancelToken::new()).await.unwrap();

        assert_eq!(output.bytes, original);
        assert!(output.diagnostics.no_translatable_content);
    }

    #[tokio::test]
    async fn misdeclared_input_produces_no_output() {
        let engine = engine(ScriptedOcr(Some(Vec::new())));
        let mut job = png_job("fr");
        job.format = DocumentFormat::Pdf;

        let err = engine.run(job, &CancelToken::new()).await.unwrap_err();
        assert!(err.is_input_error(), "{}", err);
    }

    #[tokio::test]
    async fn cancelled_jobs_return_no_bytes() {
        let engine = engine(ScriptedOcr(Some(vec![line("Hello", BBox::new(5.0, 5.0, 100.0, 20.0))])));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = engine.run(png_job("fr"), &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
