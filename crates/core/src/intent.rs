use crate::lexicon::IntentKeywords;
use crate::models::{IntentClassification, PrimaryIntent, RestaurantContext};

pub const HIGH_FAQ_CONFIDENCE: f32 = 0.8;
pub const MEDIUM_FAQ_CONFIDENCE: f32 = 0.5;

/// Handler a turn is dispatched to once FAQ confidence is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    FaqEnriched,
    Mixed,
    Restaurant(RestaurantContext),
    Tourism,
    FaqMedium,
    Unknown,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FaqEnriched => "faq_enriched",
            Self::Mixed => "mixed",
            Self::Restaurant(RestaurantContext::Internal) => "restaurant_internal",
            Self::Restaurant(_) => "restaurant_external",
            Self::Tourism => "tourism",
            Self::FaqMedium => "faq_medium",
            Self::Unknown => "unknown",
        }
    }
}

pub fn normalize_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Keyword classifier over pivot-language text.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    keywords: IntentKeywords,
}

impl IntentClassifier {
    pub fn new(keywords: IntentKeywords) -> Self {
        Self { keywords }
    }

    pub fn classify(&self, text: &str) -> IntentClassification {
        let lower = normalize_text(text).to_lowercase();

        let tourism = contains_any(&lower, &self.keywords.tourism);
        let restaurant = contains_any(&lower, &self.keywords.restaurant_general);

        let (restaurant_context, confidence, internal_signals, external_signals) = if restaurant {
            let internal = count_matches(&lower, &self.keywords.restaurant_internal);
            let external = count_matches(&lower, &self.keywords.restaurant_external);
            let context = if internal > external {
                RestaurantContext::Internal
            } else {
                RestaurantContext::External
            };
            let dominant = internal.max(external);
            let confidence = (0.8 + 0.1 * dominant as f32).min(1.0);
            (context, confidence, internal, external)
        } else {
            (RestaurantContext::None, 0.0, 0, 0)
        };

        let primary = match (tourism, restaurant) {
            (true, true) => PrimaryIntent::Mixed,
            (false, true) => PrimaryIntent::Restaurant,
            (true, false) => PrimaryIntent::Tourism,
            (false, false) => PrimaryIntent::Unknown,
        };

        IntentClassification {
            primary,
            restaurant_context,
            confidence,
            tourism,
            restaurant,
            internal_signals,
            external_signals,
        }
    }
}

impl IntentClassification {
    /// Folds the FAQ confidence in as the fourth signal.
    pub fn route(&self, faq_confidence: f32) -> Route {
        if faq_confidence >= HIGH_FAQ_CONFIDENCE {
            return Route::FaqEnriched;
        }
        match (self.tourism, self.restaurant) {
            (true, true) => Route::Mixed,
            (_, true) => Route::Restaurant(self.restaurant_context),
            (true, false) => Route::Tourism,
            (false, false) if faq_confidence >= MEDIUM_FAQ_CONFIDENCE => Route::FaqMedium,
            (false, false) => Route::Unknown,
        }
    }
}

fn contains_any(input: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| input.contains(needle.as_str()))
}

fn count_matches(input: &str, needles: &[String]) -> usize {
    needles
        .iter()
        .filter(|needle| input.contains(needle.as_str()))
        .count()
}
