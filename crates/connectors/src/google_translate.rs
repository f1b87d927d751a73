use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tabi_core::{CollaboratorError, LangCode, TranslationEngine};
use url::Url;

use crate::{check_status, http_client, send_error};

const SERVICE: &str = "google_translate";
const DEFAULT_BASE_URL: &str = "https://translation.googleapis.com";

/// Cloud Translation v2 with an API key.
pub struct GoogleTranslateClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleTranslateClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, CollaboratorError> {
        Url::parse_with_params(
            &format!("{}/language/translate/v2{}", self.base_url, path),
            &[("key", self.api_key.as_str())],
        )
        .map_err(|err| CollaboratorError::invalid(SERVICE, err.to_string()))
    }

    fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value, CollaboratorError> {
        let response = self
            .client
            .post(self.endpoint(path)?)
            .json(&body)
            .send()
            .map_err(|err| send_error(SERVICE, err))?;
        check_status(SERVICE, response)?
            .json::<serde_json::Value>()
            .map_err(|err| CollaboratorError::invalid(SERVICE, err.to_string()))
    }
}

pub(crate) fn google_code(language: LangCode) -> &'static str {
    match language {
        LangCode::Ja => "ja",
        LangCode::En => "en",
        LangCode::Ko => "ko",
        LangCode::Zh => "zh-CN",
        LangCode::ZhTw => "zh-TW",
    }
}

#[derive(Deserialize)]
struct TranslateData {
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

#[derive(Deserialize)]
struct DetectData {
    detections: Vec<Vec<Detection>>,
}

#[derive(Deserialize)]
struct Detection {
    language: String,
    #[serde(default)]
    confidence: f32,
}

fn parse_translation(value: serde_json::Value) -> Result<String, CollaboratorError> {
    let data: TranslateData = serde_json::from_value(value.get("data").cloned().unwrap_or_default())
        .map_err(|err| CollaboratorError::invalid(SERVICE, err.to_string()))?;
    data.translations
        .into_iter()
        .next()
        .map(|translation| translation.translated_text)
        .ok_or_else(|| CollaboratorError::invalid(SERVICE, "no translations in response"))
}

fn parse_detection(value: serde_json::Value) -> Result<Option<(LangCode, f32)>, CollaboratorError> {
    let data: DetectData = serde_json::from_value(value.get("data").cloned().unwrap_or_default())
        .map_err(|err| CollaboratorError::invalid(SERVICE, err.to_string()))?;
    Ok(data
        .detections
        .into_iter()
        .flatten()
        .find_map(|detection| {
            LangCode::parse(&detection.language).map(|language| (language, detection.confidence))
        }))
}

impl TranslationEngine for GoogleTranslateClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    fn translate(
        &self,
        text: &str,
        target: LangCode,
        source: Option<LangCode>,
    ) -> Result<String, CollaboratorError> {
        let mut body = json!({
            "q": text,
            "target": google_code(target),
            "format": "text",
        });
        if let Some(source) = source {
            body["source"] = json!(google_code(source));
        }
        parse_translation(self.post("", body)?)
    }

    fn detect_language(&self, text: &str) -> Result<Option<(LangCode, f32)>, CollaboratorError> {
        parse_detection(self.post("/detect", json!({ "q": text }))?)
    }
}
