//! Error types for the translation engine.

use std::io;
use thiserror::Error;

use crate::data::DocumentFormat;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Document-wide failures. Per-unit problems are recorded as
/// [`Degradation`](crate::model::Degradation) values instead.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The byte stream cannot be parsed as the claimed format.
    #[error("unsupported or corrupt {format} input: {reason}")]
    UnsupportedOrCorruptInput {
        format: DocumentFormat,
        reason: String,
    },

    /// The language identifier is not in the script registry.
    #[error("unknown language '{0}'")]
    UnknownLanguage(String),

    /// The declared format tag is not one of the supported containers.
    #[error("unknown document format '{0}'")]
    UnknownFormat(String),

    /// Every translation batch failed after retries.
    #[error("translation unavailable ({failed_batches} batch(es) failed): {reason}")]
    TranslationUnavailable {
        failed_batches: usize,
        reason: String,
    },

    /// The job was cancelled before output was produced.
    #[error("job cancelled")]
    Cancelled,

    /// The adapter could not serialize the reconstructed document.
    #[error("render error: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    pub(crate) fn corrupt(format: DocumentFormat, reason: impl Into<String>) -> Self {
        EngineError::UnsupportedOrCorruptInput {
            format,
            reason: reason.into(),
        }
    }

    /// Whether the error stems from the caller's input rather than the engine.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EngineError::UnsupportedOrCorruptInput { .. }
                | EngineError::UnknownLanguage(_)
                | EngineError::UnknownFormat(_)
        )
    }
}

impl From<lopdf::Error> for EngineError {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => EngineError::Io(e),
            other => EngineError::Render(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_input_message_names_format() {
        let err = EngineError::corrupt(DocumentFormat::Pdf, "missing %PDF header");
        assert_eq!(
            err.to_string(),
            "unsupported or corrupt pdf input: missing %PDF header"
        );
        assert!(err.is_input_error());
    }

    #[test]
    fn cancelled_is_not_input_error() {
        assert!(!EngineError::Cancelled.is_input_error());
    }
}
