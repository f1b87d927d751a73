use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tabi_core::{CollaboratorError, LangCode, TranslationEngine};

use crate::{check_status, http_client, send_error};

const SERVICE: &str = "llm_translate";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1000;

const PREAMBLES: [&str; 8] = [
    "翻訳結果:",
    "번역 결과:",
    "Translation result:",
    "翻译结果:",
    "翻訳結果：",
    "번역 결과：",
    "Translation result：",
    "翻译结果：",
];

/// Messages-API model used as the fallback translation engine.
pub struct LlmTranslateClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl LlmTranslateClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

pub fn build_prompt(text: &str, target: LangCode, source: Option<LangCode>) -> String {
    let source_name = source.map_or("原文", LangCode::pivot_display_name);
    format!(
        "以下の{source_name}のテキストを{}に翻訳してください。\n\n翻訳対象テキスト:\n{text}\n\n重要：「翻訳結果:」などの前置きは一切つけず、翻訳したテキストのみを出力してください。§§で囲まれた記号はそのまま残してください。",
        target.pivot_display_name()
    )
}

/// Removes one leading "Translation result:" style label, if present.
pub fn strip_preamble(output: &str) -> String {
    let trimmed = output.trim();
    PREAMBLES
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

fn parse_messages(value: serde_json::Value) -> Result<String, CollaboratorError> {
    let response: MessagesResponse = serde_json::from_value(value)
        .map_err(|err| CollaboratorError::invalid(SERVICE, err.to_string()))?;
    let text = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(CollaboratorError::invalid(SERVICE, "empty completion"));
    }
    Ok(strip_preamble(&text))
}

impl TranslationEngine for LlmTranslateClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    fn translate(
        &self,
        text: &str,
        target: LangCode,
        source: Option<LangCode>,
    ) -> Result<String, CollaboratorError> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": build_prompt(text, target, source) }],
        });
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .map_err(|err| send_error(SERVICE, err))?;
        let value = check_status(SERVICE, response)?
            .json::<serde_json::Value>()
            .map_err(|err| CollaboratorError::invalid(SERVICE, err.to_string()))?;
        parse_messages(value)
    }

    /// The messages API has no detection endpoint.
    fn detect_language(&self, _text: &str) -> Result<Option<(LangCode, f32)>, CollaboratorError> {
        Ok(None)
    }
}
