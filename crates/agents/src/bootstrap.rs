//! Builds a ready pipeline from `TABI_*` settings. HTTP clients are blocking,
//! so call [`build_pipeline`] off the async runtime.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tabi_connectors::{GoogleTranslateClient, LineNotifier, LlmTranslateClient, PlacesClient};
use tabi_core::{
    BoundedCache, CompanyRecordStore, DisabledPlaces, EscalationNotifier, FaqLookup, Lexicon,
    LogNotifier, PlacesSearch, TranslationEngine,
};
use tabi_language::{
    EngineDetector, LanguageDetector, StatisticalDetector, TranslationCache,
    TranslationOrchestrator, WhatlangDetector, DEFAULT_MAX_ATTEMPTS,
};
use tabi_location::{Gazetteer, LocationResolver};
use tabi_observability::AppMetrics;
use tabi_retrieval::{FaqIndex, FaqStats};
use tracing::info;

use crate::orchestrator::{
    Collaborators, ResponseOrchestrator, SessionLanguages, DEFAULT_SESSION_CAPACITY,
};

pub const DEFAULT_CACHE_CAPACITY: usize = 1000;
pub const DEFAULT_LLM_MODEL: &str = "claude-3-haiku-20240307";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatisticalBackend {
    Whatlang,
    Engine,
    Disabled,
}

impl StatisticalBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "whatlang" => Some(Self::Whatlang),
            "engine" | "google" => Some(Self::Engine),
            "none" | "off" | "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub detection_cache_capacity: usize,
    pub translation_cache_capacity: usize,
    pub session_capacity: usize,
    pub max_translation_attempts: usize,
    pub http_timeout: Duration,
    pub statistical: StatisticalBackend,
    pub google_api_key: Option<String>,
    pub google_translate_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_url: Option<String>,
    pub places_api_key: Option<String>,
    pub places_url: Option<String>,
    pub line_channel_token: Option<String>,
    pub line_recipients: Vec<String>,
    pub faq_dir: Option<PathBuf>,
    pub lexicon_path: Option<PathBuf>,
    pub gazetteer_path: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            detection_cache_capacity: DEFAULT_CACHE_CAPACITY,
            translation_cache_capacity: DEFAULT_CACHE_CAPACITY,
            session_capacity: DEFAULT_SESSION_CAPACITY,
            max_translation_attempts: DEFAULT_MAX_ATTEMPTS,
            http_timeout: tabi_connectors::DEFAULT_TIMEOUT,
            statistical: StatisticalBackend::Whatlang,
            google_api_key: None,
            google_translate_url: None,
            llm_api_key: None,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_url: None,
            places_api_key: None,
            places_url: None,
            line_channel_token: None,
            line_recipients: Vec::new(),
            faq_dir: None,
            lexicon_path: None,
            gazetteer_path: None,
        }
    }
}

impl PipelineSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            detection_cache_capacity: env_parse("TABI_DETECTION_CACHE_SIZE")
                .unwrap_or(defaults.detection_cache_capacity),
            translation_cache_capacity: env_parse("TABI_TRANSLATION_CACHE_SIZE")
                .unwrap_or(defaults.translation_cache_capacity),
            session_capacity: env_parse("TABI_SESSION_CACHE_SIZE")
                .unwrap_or(defaults.session_capacity),
            max_translation_attempts: env_parse("TABI_TRANSLATION_MAX_ATTEMPTS")
                .unwrap_or(defaults.max_translation_attempts),
            http_timeout: env_parse::<u64>("TABI_HTTP_TIMEOUT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            statistical: env_string("TABI_STATISTICAL_DETECTOR")
                .and_then(|value| StatisticalBackend::parse(&value))
                .unwrap_or(defaults.statistical),
            google_api_key: env_string("TABI_GOOGLE_API_KEY"),
            google_translate_url: env_string("TABI_GOOGLE_TRANSLATE_URL"),
            llm_api_key: env_string("TABI_LLM_API_KEY"),
            llm_model: env_string("TABI_LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_url: env_string("TABI_LLM_URL"),
            places_api_key: env_string("TABI_PLACES_API_KEY")
                .or_else(|| env_string("TABI_GOOGLE_API_KEY")),
            places_url: env_string("TABI_PLACES_URL"),
            line_channel_token: env_string("TABI_LINE_CHANNEL_TOKEN"),
            line_recipients: env_string("TABI_LINE_RECIPIENTS")
                .map(|value| {
                    value
                        .split(',')
                        .map(|recipient| recipient.trim().to_string())
                        .filter(|recipient| !recipient.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            faq_dir: env_string("TABI_FAQ_DIR").map(PathBuf::from),
            lexicon_path: env_string("TABI_LEXICON_PATH").map(PathBuf::from),
            gazetteer_path: env_string("TABI_GAZETTEER_PATH").map(PathBuf::from),
        }
    }
}

/// Which optional collaborators are live, reported by `/health` and `tabi stats`.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub primary_translation: bool,
    pub fallback_translation: bool,
    pub statistical_detection: StatisticalBackend,
    pub places_search: bool,
    pub staff_notifications: bool,
    pub faq: FaqStats,
}

pub struct Pipeline {
    pub orchestrator: Arc<ResponseOrchestrator>,
    pub capabilities: Capabilities,
}

pub fn build_pipeline(
    settings: &PipelineSettings,
    companies: Arc<dyn CompanyRecordStore>,
    metrics: Arc<AppMetrics>,
) -> Result<Pipeline> {
    let lexicon = Lexicon::load(settings.lexicon_path.as_deref()).context("failed to load lexicon")?;
    let gazetteer =
        Gazetteer::load(settings.gazetteer_path.as_deref()).context("failed to load gazetteer")?;

    let primary: Option<Arc<dyn TranslationEngine>> = match settings.google_api_key.as_deref() {
        Some(key) => {
            let mut client = GoogleTranslateClient::new(key, settings.http_timeout)?;
            if let Some(url) = settings.google_translate_url.as_deref() {
                client = client.with_base_url(url);
            }
            Some(Arc::new(client))
        }
        None => None,
    };
    let fallback: Option<Arc<dyn TranslationEngine>> = match settings.llm_api_key.as_deref() {
        Some(key) => {
            let mut client =
                LlmTranslateClient::new(key, settings.llm_model.clone(), settings.http_timeout)?;
            if let Some(url) = settings.llm_url.as_deref() {
                client = client.with_base_url(url);
            }
            Some(Arc::new(client))
        }
        None => None,
    };

    let statistical: Option<Arc<dyn StatisticalDetector>> = match settings.statistical {
        StatisticalBackend::Whatlang => Some(Arc::new(WhatlangDetector::new())),
        StatisticalBackend::Engine => primary
            .clone()
            .map(|engine| Arc::new(EngineDetector::new(engine)) as Arc<dyn StatisticalDetector>),
        StatisticalBackend::Disabled => None,
    };

    let places: Arc<dyn PlacesSearch> = match settings.places_api_key.as_deref() {
        Some(key) => {
            let mut client = PlacesClient::new(key, settings.http_timeout)?;
            if let Some(url) = settings.places_url.as_deref() {
                client = client.with_base_url(url);
            }
            Arc::new(client)
        }
        None => Arc::new(DisabledPlaces),
    };

    let notifier: Arc<dyn EscalationNotifier> = match settings.line_channel_token.as_deref() {
        Some(token) if !settings.line_recipients.is_empty() => Arc::new(LineNotifier::new(
            token,
            settings.line_recipients.clone(),
            settings.http_timeout,
        )?),
        _ => Arc::new(LogNotifier),
    };

    let faq_index = match settings.faq_dir.as_deref() {
        Some(dir) => FaqIndex::from_dir(dir)
            .with_context(|| format!("failed to load FAQ corpus from {}", dir.display()))?,
        None => FaqIndex::default(),
    };

    let capabilities = Capabilities {
        primary_translation: primary.is_some(),
        fallback_translation: fallback.is_some(),
        statistical_detection: if statistical.is_some() {
            settings.statistical
        } else {
            StatisticalBackend::Disabled
        },
        places_search: settings.places_api_key.is_some(),
        staff_notifications: settings.line_channel_token.is_some()
            && !settings.line_recipients.is_empty(),
        faq: faq_index.stats(),
    };
    let faq: Arc<dyn FaqLookup> = Arc::new(faq_index);

    let detector = Arc::new(LanguageDetector::new(
        &lexicon,
        Arc::new(BoundedCache::new(settings.detection_cache_capacity)),
        statistical,
    ));
    let translator = Arc::new(TranslationOrchestrator::new(
        &lexicon,
        primary,
        fallback,
        Arc::new(TranslationCache::new(settings.translation_cache_capacity)),
        settings.max_translation_attempts,
    ));
    let resolver = Arc::new(LocationResolver::new(Arc::new(gazetteer), companies));

    let orchestrator = ResponseOrchestrator::new(
        &lexicon,
        detector,
        translator,
        resolver,
        Collaborators {
            places,
            faq,
            notifier,
        },
        Arc::new(SessionLanguages::new(settings.session_capacity)),
        metrics,
    );

    info!(
        primary_translation = capabilities.primary_translation,
        fallback_translation = capabilities.fallback_translation,
        places = capabilities.places_search,
        notifications = capabilities.staff_notifications,
        faq_entries = capabilities.faq.entries,
        "pipeline ready"
    );

    Ok(Pipeline {
        orchestrator: Arc::new(orchestrator),
        capabilities,
    })
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|value| value.parse::<T>().ok())
}
