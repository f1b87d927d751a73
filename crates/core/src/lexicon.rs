//! Keyword tables and place-name equivalents, shipped as configuration data.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::LangCode;

const BUNDLED: &str = include_str!("../data/lexicon.json");

#[derive(Debug, Clone, Deserialize)]
pub struct IntentKeywords {
    pub tourism: Vec<String>,
    pub restaurant_general: Vec<String>,
    pub restaurant_internal: Vec<String>,
    pub restaurant_external: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceNameEquivalent {
    pub ja: String,
    pub en: String,
    pub ko: String,
    pub zh: String,
    #[serde(rename = "zh-tw")]
    pub zh_tw: String,
}

impl PlaceNameEquivalent {
    pub fn in_language(&self, language: LangCode) -> &str {
        match language {
            LangCode::Ja => &self.ja,
            LangCode::En => &self.en,
            LangCode::Ko => &self.ko,
            LangCode::Zh => &self.zh,
            LangCode::ZhTw => &self.zh_tw,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Lexicon {
    pub version: u32,
    pub intent: IntentKeywords,
    pub detection_keywords: HashMap<LangCode, Vec<String>>,
    pub english_markers: Vec<String>,
    pub pivot_domain_nouns: Vec<String>,
    pub api_error_phrases: Vec<String>,
    pub place_names: Vec<PlaceNameEquivalent>,
}

impl Lexicon {
    pub fn bundled() -> Result<Self, ConfigError> {
        Self::from_json(BUNDLED)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let mut lexicon: Lexicon = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            what: "lexicon",
            source,
        })?;
        lexicon.normalize()?;
        Ok(lexicon)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Override file when given, bundled tables otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::bundled(),
        }
    }

    pub fn detection_keywords(&self, language: LangCode) -> &[String] {
        self.detection_keywords
            .get(&language)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    // Matching is done on lowercased text, so keywords are stored lowercased.
    fn normalize(&mut self) -> Result<(), ConfigError> {
        let lists: [(&'static str, &mut Vec<String>); 6] = [
            ("intent.tourism", &mut self.intent.tourism),
            ("intent.restaurant_general", &mut self.intent.restaurant_general),
            ("intent.restaurant_internal", &mut self.intent.restaurant_internal),
            ("intent.restaurant_external", &mut self.intent.restaurant_external),
            ("english_markers", &mut self.english_markers),
            ("api_error_phrases", &mut self.api_error_phrases),
        ];
        for (what, list) in lists {
            lowercase_all(what, list)?;
        }
        for list in self.detection_keywords.values_mut() {
            lowercase_all("detection_keywords", list)?;
        }
        if self.intent.restaurant_general.is_empty() || self.intent.tourism.is_empty() {
            return Err(ConfigError::Invalid {
                what: "lexicon",
                message: "intent keyword sets must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn lowercase_all(what: &'static str, list: &mut [String]) -> Result<(), ConfigError> {
    for keyword in list.iter_mut() {
        let trimmed = keyword.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::Invalid {
                what: "lexicon",
                message: format!("blank keyword in {what}"),
            });
        }
        *keyword = trimmed.to_lowercase();
    }
    Ok(())
}
