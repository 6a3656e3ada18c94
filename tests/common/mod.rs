#![allow(dead_code)]

use anyhow::anyhow;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use layout_translator::providers::BackendFuture;
use layout_translator::settings::Settings;
use layout_translator::ocr::{OcrEngine, OcrLine};
use layout_translator::{CancelToken, Engine, TranslationBackend};

pub fn fixture_fonts() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fonts")
}

/// Defaults with the fixture fonts, no system lookups and instant retries.
pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.fonts.dir = fixture_fonts();
    settings.fonts.system_fallback = false;
    settings.translation.retry_base_delay = Duration::ZERO;
    settings.translation.max_retries = 1;
    settings.render.workers = 2;
    settings
}

pub fn engine(settings: Settings, backend: Arc<dyn TranslationBackend>) -> Engine {
    Engine::new(settings, backend, Arc::new(NoOcr)).unwrap()
}

pub struct NoOcr;

impl OcrEngine for NoOcr {
    fn recognize(&self, _image: &[u8]) -> anyhow::Result<Vec<OcrLine>> {
        Ok(Vec::new())
    }
}

/// Rewrites each text with `rule`; a batch fails when any text contains
/// `poison`. Every call is recorded.
pub struct ScriptedBackend {
    rule: fn(&str) -> String,
    poison: Option<&'static str>,
    cancel: Option<CancelToken>,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new(rule: fn(&str) -> String) -> Self {
        Self {
            rule,
            poison: None,
            cancel: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, poison: &'static str) -> Self {
        self.poison = Some(poison);
        self
    }

    /// Cancels `token` while answering, as a user aborting mid-job would.
    pub fn cancelling(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl TranslationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn translate_batch<'a>(
        &'a self,
        texts: &'a [String],
        _source_lang: Option<&'a str>,
        _target_lang: &'a str,
    ) -> BackendFuture<'a> {
        self.calls.lock().unwrap().push(texts.to_vec());
        Box::pin(async move {
            if let Some(token) = &self.cancel {
                token.cancel();
            }
            if let Some(poison) = self.poison {
                if texts.iter().any(|text| text.contains(poison)) {
                    return Err(anyhow!("upstream returned 500"));
                }
            }
            Ok(texts.iter().map(|text| (self.rule)(text)).collect())
        })
    }
}

pub fn uppercase(text: &str) -> String {
    text.to_uppercase()
}

/// A minimal package: content types, package rels and the main part.
pub fn build_docx(body: &str) -> Vec<u8> {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440"/></w:sectPr></w:body></w:document>"#,
        body
    );
    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#.to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#.to_string(),
        ),
        ("word/document.xml", document),
    ];

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in parts {
        writer.start_file(name, zip::write::FileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn paragraph(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, text)
}

pub fn read_part(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut out = String::new();
    file.read_to_string(&mut out).unwrap();
    out
}
