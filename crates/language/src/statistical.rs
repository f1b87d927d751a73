use std::sync::Arc;

use tabi_core::{LangCode, TranslationEngine};
use tracing::debug;
use whatlang::{Detector, Lang};

/// Third signal of the weighted detector: per-language probabilities from a
/// statistical model. An empty result means "no opinion".
pub trait StatisticalDetector: Send + Sync {
    fn probabilities(&self, text: &str) -> Vec<(LangCode, f32)>;
}

/// Trigram detector restricted to the supported languages.
pub struct WhatlangDetector {
    detector: Detector,
}

impl WhatlangDetector {
    pub fn new() -> Self {
        Self {
            detector: Detector::with_allowlist(vec![Lang::Eng, Lang::Jpn, Lang::Kor, Lang::Cmn]),
        }
    }
}

impl Default for WhatlangDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticalDetector for WhatlangDetector {
    fn probabilities(&self, text: &str) -> Vec<(LangCode, f32)> {
        let Some(info) = self.detector.detect(text) else {
            return Vec::new();
        };
        let language = match info.lang() {
            Lang::Eng => LangCode::En,
            Lang::Jpn => LangCode::Ja,
            Lang::Kor => LangCode::Ko,
            // script-level disambiguation happens in post-processing
            Lang::Cmn => LangCode::Zh,
            _ => return Vec::new(),
        };
        vec![(language, info.confidence() as f32)]
    }
}

/// Uses a translation engine's language detection as the statistical signal.
pub struct EngineDetector {
    engine: Arc<dyn TranslationEngine>,
}

impl EngineDetector {
    pub fn new(engine: Arc<dyn TranslationEngine>) -> Self {
        Self { engine }
    }
}

impl StatisticalDetector for EngineDetector {
    fn probabilities(&self, text: &str) -> Vec<(LangCode, f32)> {
        match self.engine.detect_language(text) {
            Ok(Some((language, confidence))) => vec![(language, confidence.clamp(0.0, 1.0))],
            Ok(None) => Vec::new(),
            Err(err) => {
                debug!(engine = self.engine.name(), error = %err, "statistical detection skipped");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whatlang_recognizes_english_sentence() {
        let detector = WhatlangDetector::new();
        let scores = detector
            .probabilities("Could you tell me where the nearest train station is located?");
        assert_eq!(scores.first().map(|(lang, _)| *lang), Some(LangCode::En));
    }

    #[test]
    fn whatlang_has_no_opinion_on_digits() {
        let detector = WhatlangDetector::new();
        assert!(detector.probabilities("12345 67890").is_empty());
    }
}
