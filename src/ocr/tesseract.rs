use anyhow::{Context, Result, anyhow};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use super::preprocess::{ocr_scale, prepare};
use super::{OcrEngine, OcrLine, parse::parse_tsv_lines};

/// Recognizes text by running the `tesseract` binary in TSV mode.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    /// `+`-joined tesseract language codes, e.g. `eng+jpn`.
    pub languages: String,
    pub min_confidence: f32,
}

impl TesseractOcr {
    pub fn new(languages: impl Into<String>, min_confidence: f32) -> Self {
        Self {
            languages: languages.into(),
            min_confidence,
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &[u8]) -> Result<Vec<OcrLine>> {
        let decoded = image::load_from_memory(image).with_context(|| "failed to decode image for OCR")?;
        let scale = ocr_scale(decoded.width());
        let languages = normalize_ocr_languages(&self.languages)?;

        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        prepare(decoded, scale)
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().with_context(|| "failed to flush temp image for OCR")?;

        let tsv = run_tesseract_tsv(tmp.path(), &languages)?;
        let lines = parse_tsv_lines(&tsv, self.min_confidence, scale as f32);
        debug!("tesseract ({}) recognized {} line(s)", languages, lines.len());
        Ok(lines)
    }
}

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect())
}

/// Keeps the requested languages tesseract actually has. When the list
/// cannot be queried the request is passed through unchanged.
fn normalize_ocr_languages(requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }
    let available = match list_tesseract_languages() {
        Ok(list) => list,
        Err(_) => return Ok(trimmed.to_string()),
    };

    let (chosen, missing): (Vec<&str>, Vec<&str>) = trimmed
        .split(['+', ',', ' '])
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .partition(|lang| available.iter().any(|value| value == lang));

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!("ocr language(s) not available: {}", missing.join(", "));
    }
    Ok(chosen.join("+"))
}

fn run_tesseract_tsv(path: &Path, languages: &str) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg("3")
        .arg("--dpi")
        .arg("300")
        .arg("tsv")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
