use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::error::{EngineError, Result};

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const PDF_MIME: &str = "application/pdf";
pub const PNG_MIME: &str = "image/png";
pub const JPEG_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    Jpeg,
}

/// Container format of a job's input and output. Selected once at job entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Image(ImageKind),
}

impl DocumentFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => PDF_MIME,
            DocumentFormat::Docx => DOCX_MIME,
            DocumentFormat::Image(ImageKind::Png) => PNG_MIME,
            DocumentFormat::Image(ImageKind::Jpeg) => JPEG_MIME,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::Image(ImageKind::Png) => "png",
            DocumentFormat::Image(ImageKind::Jpeg) => "jpg",
        }
    }

    /// Parses a declared tag (`pdf`, `docx`, `image/png`, `image/jpeg`, a
    /// bare extension or a full mime). `auto` is handled by [`resolve_format`].
    pub fn from_tag(tag: &str) -> Result<Self> {
        let lower = tag.trim().to_lowercase();
        match lower.as_str() {
            "pdf" | PDF_MIME => Ok(DocumentFormat::Pdf),
            "docx" | "docs" | DOCX_MIME => Ok(DocumentFormat::Docx),
            "png" | PNG_MIME => Ok(DocumentFormat::Image(ImageKind::Png)),
            "jpg" | "jpeg" | JPEG_MIME | "image/jpg" => Ok(DocumentFormat::Image(ImageKind::Jpeg)),
            _ => Err(EngineError::UnknownFormat(tag.trim().to_string())),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Pdf => f.write_str("pdf"),
            DocumentFormat::Docx => f.write_str("docx"),
            DocumentFormat::Image(ImageKind::Png) => f.write_str("image/png"),
            DocumentFormat::Image(ImageKind::Jpeg) => f.write_str("image/jpeg"),
        }
    }
}

/// Resolves the job format from a declared tag. A declared tag is trusted as
/// is (the adapter rejects mismatching bytes); `auto` sniffs the bytes and then
/// falls back to the file extension.
pub fn resolve_format(tag: &str, bytes: &[u8], path: Option<&Path>) -> Result<DocumentFormat> {
    let raw = tag.trim();
    if !raw.is_empty() && !raw.eq_ignore_ascii_case("auto") {
        return DocumentFormat::from_tag(raw);
    }
    if let Some(format) = sniff_format(bytes) {
        return Ok(format);
    }
    if let Some(ext) = extension_lower(path) {
        if let Ok(format) = DocumentFormat::from_tag(&ext) {
            return Ok(format);
        }
    }
    Err(EngineError::UnknownFormat(
        path.map(|value| value.display().to_string())
            .unwrap_or_else(|| "stdin".to_string()),
    ))
}

pub fn sniff_format(bytes: &[u8]) -> Option<DocumentFormat> {
    let kind = infer::get(bytes)?;
    match kind.mime_type() {
        PDF_MIME => Some(DocumentFormat::Pdf),
        PNG_MIME => Some(DocumentFormat::Image(ImageKind::Png)),
        JPEG_MIME => Some(DocumentFormat::Image(ImageKind::Jpeg)),
        DOCX_MIME => Some(DocumentFormat::Docx),
        "application/zip" if contains_bytes(bytes, b"word/") => Some(DocumentFormat::Docx),
        _ => None,
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

fn extension_lower(path: Option<&Path>) -> Option<String> {
    path.and_then(|path| path.extension())
        .and_then(|value| value.to_str())
        .map(|value| value.to_lowercase())
}
