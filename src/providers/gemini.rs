use anyhow::{Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::prompt::{TOOL_NAME, parse_tool_args, render_system_prompt, render_user_input, tool_spec};
use super::retry::{Backoff, RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after};
use super::{BackendFuture, ToolSpec, TranslationBackend};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub(crate) const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini `generateContent` client forced to answer through the
/// `deliver_translations` function.
#[derive(Debug, Clone)]
pub struct Gemini {
    key: String,
    model: String,
    client: reqwest::Client,
}

impl Gemini {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl TranslationBackend for Gemini {
    fn name(&self) -> &str {
        "gemini"
    }

    fn translate_batch<'a>(
        &'a self,
        texts: &'a [String],
        source_lang: Option<&'a str>,
        target_lang: &'a str,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            let system = render_system_prompt(source_lang, target_lang, texts.len())?;
            let body = request_body(&system, &render_user_input(texts)?, &tool_spec());
            let url = format!("{}/{}:generateContent", BASE_URL, self.model);

            let mut backoff = Backoff::new(RATE_LIMIT_MAX_RETRIES, RATE_LIMIT_BASE_DELAY);
            loop {
                let response = self
                    .client
                    .post(&url)
                    .header("x-goog-api-key", self.key.as_str())
                    .json(&body)
                    .send()
                    .await?;

                let status = response.status();
                let retry_after = retry_after(response.headers());
                let text = response.text().await.unwrap_or_default();
                if status.is_success() {
                    let args = extract_tool_args(&text, TOOL_NAME)?;
                    debug!("{} returned a batch of {}", self.model, texts.len());
                    return parse_tool_args(args, texts.len());
                }
                if is_rate_limited(status, &text) && backoff.wait("Gemini rate limited", retry_after).await {
                    continue;
                }
                return Err(anyhow!(
                    "Gemini API error ({}): {}",
                    status,
                    extract_gemini_error(&text).unwrap_or(text)
                ));
            }
        })
    }
}

fn request_body(system: &str, user: &str, tool: &ToolSpec) -> Value {
    json!({
        "contents": [
            {
                "role": "user",
                "parts": [{"text": user}]
            }
        ],
        "systemInstruction": {"parts": [{"text": system}]},
        "tools": [
            {
                "function_declarations": [
                    {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters
                    }
                ]
            }
        ],
        "tool_config": {
            "function_calling_config": {
                "mode": "ANY",
                "allowed_function_names": [tool.name]
            }
        }
    })
}

fn extract_tool_args(text: &str, tool_name: &str) -> Result<Value> {
    let payload: GeminiResponse =
        serde_json::from_str(text).map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))?;
    let candidate = payload
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .ok_or_else(|| anyhow!("no candidate returned from Gemini"))?;

    candidate
        .parts
        .iter()
        .filter_map(|part| part.function_call.as_ref())
        .find(|call| call.name == tool_name)
        .map(|call| call.args.clone())
        .ok_or_else(|| anyhow!("no tool call returned from Gemini"))
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let error = serde_json::from_str::<ErrorBody>(body).ok()?.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message.filter(|value| !value.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(status) = error.status.filter(|value| !value.trim().is_empty()) {
        parts.push(format!("type: {}", status));
    }
    if let Some(code) = error.code {
        parts.push(format!("code: {}", code));
    }
    Some(if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    })
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(rename = "functionCall")]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}
