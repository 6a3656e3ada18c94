use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Value, json};
use tera::{Context as TeraContext, Tera};

use super::ToolSpec;

pub const TOOL_NAME: &str = "deliver_translations";

const SYSTEM_TEMPLATE: &str = include_str!("prompts/batch_system.tera");

pub fn tool_spec() -> ToolSpec {
    ToolSpec {
        name: TOOL_NAME.to_string(),
        description: "Return one translation per input text, in input order.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "translations": {
                    "type": "array",
                    "items": {"type": "string"}
                }
            },
            "required": ["translations"]
        }),
    }
}

pub fn render_system_prompt(source_lang: Option<&str>, target_lang: &str, count: usize) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("source_lang", &source_lang.filter(|lang| !lang.eq_ignore_ascii_case("auto")));
    context.insert("target_lang", target_lang);
    context.insert("count", &count);
    context.insert("tool_name", TOOL_NAME);
    Tera::one_off(SYSTEM_TEMPLATE, &context, false).with_context(|| "failed to render system prompt")
}

pub fn render_user_input(texts: &[String]) -> Result<String> {
    serde_json::to_string(&json!({ "texts": texts })).with_context(|| "failed to encode batch")
}

#[derive(Debug, Deserialize)]
struct ToolArgs {
    translations: Vec<String>,
}

/// Reads the tool arguments and checks the batch length.
pub fn parse_tool_args(value: Value, expected: usize) -> Result<Vec<String>> {
    let args: ToolArgs = serde_json::from_value(value).with_context(|| "malformed translation tool arguments")?;
    if args.translations.len() != expected {
        return Err(anyhow!(
            "expected {} translation(s), got {}",
            expected,
            args.translations.len()
        ));
    }
    Ok(args.translations)
}
