use std::fmt;

use serde::{Deserialize, Serialize};

/// Language the FAQ corpus and every downstream handler operate in.
pub const PIVOT_LANGUAGE: LangCode = LangCode::Ja;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LangCode {
    #[serde(rename = "ja")]
    Ja,
    #[serde(rename = "en")]
    En,
    #[serde(rename = "ko")]
    Ko,
    #[serde(rename = "zh")]
    Zh,
    #[serde(rename = "zh-tw", alias = "tw")]
    ZhTw,
}

impl LangCode {
    pub const ALL: [LangCode; 5] = [Self::Ja, Self::En, Self::Ko, Self::Zh, Self::ZhTw];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "ja" | "ja-jp" | "jpn" | "japanese" => Some(Self::Ja),
            "en" | "en-us" | "en-gb" | "eng" | "english" => Some(Self::En),
            "ko" | "ko-kr" | "kor" | "korean" => Some(Self::Ko),
            "zh" | "zh-cn" | "zh-hans" | "cmn" | "chinese" => Some(Self::Zh),
            "zh-tw" | "tw" | "zh-hant" | "zh-hk" => Some(Self::ZhTw),
            _ => None,
        }
    }

    pub fn from_optional_str(value: Option<&str>) -> Option<Self> {
        value.and_then(Self::parse)
    }

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Ja => "ja",
            Self::En => "en",
            Self::Ko => "ko",
            Self::Zh => "zh",
            Self::ZhTw => "zh-tw",
        }
    }

    pub fn is_pivot(self) -> bool {
        self == PIVOT_LANGUAGE
    }

    pub fn is_chinese(self) -> bool {
        matches!(self, Self::Zh | Self::ZhTw)
    }

    /// Display name written in the pivot language, used in prompts and staff notifications.
    pub fn pivot_display_name(self) -> &'static str {
        match self {
            Self::Ja => "日本語",
            Self::En => "英語",
            Self::Ko => "韓国語",
            Self::Zh => "中国語（簡体字）",
            Self::ZhTw => "中国語（繁体字）",
        }
    }
}

impl fmt::Display for LangCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Empty,
    FastJapanese,
    FastKorean,
    ShortTraditional,
    ShortSimplified,
    ShortEnglish,
    ShortDefault,
    Weighted,
    Fallback,
    SessionHint,
    EnglishRecheck,
}

impl DetectionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::FastJapanese => "fast_japanese",
            Self::FastKorean => "fast_korean",
            Self::ShortTraditional => "short_traditional",
            Self::ShortSimplified => "short_simplified",
            Self::ShortEnglish => "short_english",
            Self::ShortDefault => "short_default",
            Self::Weighted => "weighted",
            Self::Fallback => "fallback",
            Self::SessionHint => "session_hint",
            Self::EnglishRecheck => "english_recheck",
        }
    }

    pub fn is_fast_path(self) -> bool {
        matches!(self, Self::FastJapanese | Self::FastKorean)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub language: LangCode,
    pub confidence: f32,
    pub method: DetectionMethod,
    #[serde(default)]
    pub cached: bool,
}

impl DetectionResult {
    pub fn new(language: LangCode, confidence: f32, method: DetectionMethod) -> Self {
        Self {
            language,
            confidence: clamp_unit(confidence),
            method,
            cached: false,
        }
    }

    /// Method label as reported to callers; cache hits carry a `_cached` suffix.
    pub fn method_label(&self) -> String {
        if self.cached {
            format!("{}_cached", self.method.as_str())
        } else {
            self.method.as_str().to_string()
        }
    }

    pub fn from_cache(mut self) -> Self {
        self.cached = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Parses `"33.59,130.40"` style input.
    pub fn parse(value: &str) -> Option<Self> {
        let (lat, lng) = value.split_once(',')?;
        let lat = lat.trim().parse::<f64>().ok()?;
        let lng = lng.trim().parse::<f64>().ok()?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return None;
        }
        Some(Self { lat, lng })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    City,
    Area,
    Lake,
    Prefecture,
    Database,
    IdHint,
    DemoDefault,
    RegionalDefault,
    GpsEstimate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub city: String,
    pub prefecture: String,
    pub region: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub kind: LocationKind,
}

impl LocationRecord {
    /// Name used for place searches and response headers: city, else prefecture.
    pub fn display_name(&self) -> &str {
        if !self.city.trim().is_empty() {
            &self.city
        } else if !self.prefecture.trim().is_empty() {
            &self.prefecture
        } else {
            &self.region
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    UserInput,
    CompanyBase,
    Gps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCandidate {
    pub source: LocationSource,
    pub location: LocationRecord,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryIntent {
    Faq,
    Tourism,
    Restaurant,
    Mixed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestaurantContext {
    Internal,
    External,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub primary: PrimaryIntent,
    pub restaurant_context: RestaurantContext,
    pub confidence: f32,
    pub tourism: bool,
    pub restaurant: bool,
    pub internal_signals: usize,
    pub external_signals: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    FaqEnhanced,
    FaqMedium,
    InternalRestaurant,
    InternalRestaurantUnknown,
    ExternalRestaurant,
    RestaurantGeneral,
    Tourism,
    TourismNoLocation,
    TourismError,
    Mixed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecializedLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub answer: String,
    pub confidence: f32,
    pub response_type: ResponseType,
    pub specialized_links: Vec<SpecializedLink>,
    pub needs_human_escalation: bool,
    pub detected_language: LangCode,
    pub location_enhanced: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatInput {
    pub text: String,
    pub company_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub session_previous_language: Option<LangCode>,
    #[serde(default)]
    pub manual_location: Option<String>,
    #[serde(default)]
    pub gps_coords: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqAnswer {
    pub answer: String,
    pub confidence_hint: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceResult {
    pub name: String,
    pub address: String,
    pub rating: f32,
    pub open_now: Option<bool>,
    pub maps_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationContext {
    pub detected_language: LangCode,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_language_aliases() {
        assert_eq!(LangCode::parse("zh-TW"), Some(LangCode::ZhTw));
        assert_eq!(LangCode::parse("tw"), Some(LangCode::ZhTw));
        assert_eq!(LangCode::parse("zh-cn"), Some(LangCode::Zh));
        assert_eq!(LangCode::parse("klingon"), None);
    }

    #[test]
    fn serializes_traditional_chinese_code() {
        let json = serde_json::to_string(&LangCode::ZhTw).unwrap();
        assert_eq!(json, "\"zh-tw\"");
    }

    #[test]
    fn clamps_detection_confidence() {
        let result = DetectionResult::new(LangCode::En, 1.7, DetectionMethod::Weighted);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.from_cache().method_label(), "weighted_cached");
    }

    #[test]
    fn parses_gps_pair() {
        let point = GeoPoint::parse(" 33.59, 130.40").unwrap();
        assert!((point.lat - 33.59).abs() < 1e-9);
        assert!(GeoPoint::parse("91,10").is_none());
    }
}
