//! Machine translation collaborators. The orchestrator only sees
//! [`TranslationBackend`]; Gemini is the shipped remote implementation.

use anyhow::{Result, anyhow};
use std::future::Future;
use std::pin::Pin;

mod gemini;
pub mod prompt;
pub(crate) mod retry;

pub use gemini::Gemini;

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;

pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Translates `texts` in order. The result must have the same length;
    /// the caller treats anything else as a failed batch.
    fn translate_batch<'a>(
        &'a self,
        texts: &'a [String],
        source_lang: Option<&'a str>,
        target_lang: &'a str,
    ) -> BackendFuture<'a>;
}

/// Returns every string unchanged. Exercises the rendering path alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityBackend;

impl TranslationBackend for IdentityBackend {
    fn name(&self) -> &str {
        "identity"
    }

    fn translate_batch<'a>(
        &'a self,
        texts: &'a [String],
        _source_lang: Option<&'a str>,
        _target_lang: &'a str,
    ) -> BackendFuture<'a> {
        Box::pin(async move { Ok(texts.to_vec()) })
    }
}

/// `--key` first, then `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Ok(key.to_string());
    }
    get_env("GEMINI_API_KEY")
        .or_else(|| get_env("GOOGLE_API_KEY"))
        .ok_or_else(|| anyhow!("API key not found (checked --key, GEMINI_API_KEY, GOOGLE_API_KEY)"))
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_backend_echoes_its_input() {
        let texts = vec!["Hello".to_string(), "**Bold** move".to_string()];
        let out = IdentityBackend.translate_batch(&texts, None, "fr").await.unwrap();
        assert_eq!(out, texts);
    }

    #[test]
    fn explicit_key_wins() {
        assert_eq!(resolve_key(Some("abc")).unwrap(), "abc");
    }
}
