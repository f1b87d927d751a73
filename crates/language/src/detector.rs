//! Multi-layer language detection: cache, script fast path, short-text rules,
//! weighted analysis and post-processing overrides.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tabi_core::script::{
    self, count_in_set, has_hangul, has_han, has_kana, is_ascii_wordlike, ScriptProfile,
    JAPANESE_ONLY_KANJI, MAINLAND_MARKERS, TAIWAN_MARKERS,
};
use tabi_core::{BoundedCache, CacheStats, DetectionMethod, DetectionResult, LangCode, Lexicon};
use tracing::debug;

use crate::statistical::StatisticalDetector;

pub const SHORT_TEXT_CHARS: usize = 5;
pub const MAX_WEIGHTED_CONFIDENCE: f32 = 0.9;

const PATTERN_WEIGHT: f32 = 0.4;
const KEYWORD_WEIGHT: f32 = 0.3;
const STATISTICAL_WEIGHT: f32 = 0.3;

/// Multi-pattern bonus applied when more than one pattern group fires.
const MULTI_PATTERN_BONUS: f32 = 1.2;

struct PatternGroup {
    weight: f32,
    kind: PatternKind,
}

enum PatternKind {
    Glyphs(&'static str),
    Hangul,
    AsciiLetters,
    EnglishMarkers,
}

const JA_PATTERNS: &[PatternGroup] = &[PatternGroup {
    weight: 0.7,
    kind: PatternKind::Glyphs(JAPANESE_ONLY_KANJI),
}];
const KO_PATTERNS: &[PatternGroup] = &[PatternGroup {
    weight: 0.9,
    kind: PatternKind::Hangul,
}];
const ZH_PATTERNS: &[PatternGroup] = &[PatternGroup {
    weight: 0.6,
    kind: PatternKind::Glyphs(MAINLAND_MARKERS),
}];
const ZH_TW_PATTERNS: &[PatternGroup] = &[PatternGroup {
    weight: 0.7,
    kind: PatternKind::Glyphs(TAIWAN_MARKERS),
}];
const EN_PATTERNS: &[PatternGroup] = &[
    PatternGroup {
        weight: 0.6,
        kind: PatternKind::AsciiLetters,
    },
    PatternGroup {
        weight: 0.4,
        kind: PatternKind::EnglishMarkers,
    },
];

pub struct LanguageDetector {
    cache: Arc<BoundedCache<String, DetectionResult>>,
    statistical: Option<Arc<dyn StatisticalDetector>>,
    keywords: HashMap<LangCode, Vec<String>>,
    english_markers: HashSet<String>,
}

impl LanguageDetector {
    pub fn new(
        lexicon: &Lexicon,
        cache: Arc<BoundedCache<String, DetectionResult>>,
        statistical: Option<Arc<dyn StatisticalDetector>>,
    ) -> Self {
        let keywords = LangCode::ALL
            .iter()
            .map(|lang| (*lang, lexicon.detection_keywords(*lang).to_vec()))
            .collect();
        Self {
            cache,
            statistical,
            keywords,
            english_markers: lexicon.english_markers.iter().cloned().collect(),
        }
    }

    pub fn detect(&self, text: &str) -> DetectionResult {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return DetectionResult::new(LangCode::Ja, 0.0, DetectionMethod::Empty);
        }

        let key = trimmed.to_string();
        if let Some(hit) = self.cache.get(&key) {
            return hit.from_cache();
        }

        let raw = if has_kana(trimmed) {
            DetectionResult::new(LangCode::Ja, 0.95, DetectionMethod::FastJapanese)
        } else if has_hangul(trimmed) {
            DetectionResult::new(LangCode::Ko, 0.95, DetectionMethod::FastKorean)
        } else if trimmed.chars().count() <= SHORT_TEXT_CHARS {
            short_text(trimmed)
        } else {
            self.weighted(trimmed)
        };

        let result = post_process(trimmed, raw);
        debug!(
            language = %result.language,
            confidence = result.confidence,
            method = result.method.as_str(),
            "language detected"
        );
        self.cache.insert(key, result);
        result
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    /// Latin-script text with English function words and no CJK characters.
    /// A Latin brand name inside Han text stays with the Han reading.
    pub fn looks_english(&self, text: &str) -> bool {
        let profile = ScriptProfile::of(text);
        if profile.has_cjk() {
            return false;
        }
        if profile.ratio(profile.latin) < 0.3 {
            return false;
        }
        self.english_marker_hits(text) > 0
    }

    /// Whether the characters of `text` agree with a remembered session language.
    pub fn hint_consistent(&self, hint: LangCode, text: &str) -> bool {
        let profile = ScriptProfile::of(text);
        if profile.letters() == 0 {
            return false;
        }
        match hint {
            LangCode::Ja => profile.kana() > 0 || profile.han > 0,
            LangCode::Ko => profile.ratio(profile.hangul) >= 0.3,
            LangCode::En => !profile.has_cjk() && profile.ratio(profile.latin) >= 0.5,
            LangCode::Zh | LangCode::ZhTw => {
                if profile.kana() > 0 || profile.hangul > 0 || profile.ratio(profile.han) < 0.5 {
                    return false;
                }
                let traditional = script::traditional_glyphs(text);
                let simplified = script::simplified_glyphs(text);
                match hint {
                    LangCode::ZhTw => simplified <= traditional,
                    _ => traditional <= simplified,
                }
            }
        }
    }

    fn weighted(&self, text: &str) -> DetectionResult {
        let statistical: HashMap<LangCode, f32> = self
            .statistical
            .as_ref()
            .map(|detector| detector.probabilities(text).into_iter().collect())
            .unwrap_or_default();

        let mut best: Option<(LangCode, f32)> = None;
        for language in LangCode::ALL {
            let pattern = self.pattern_score(language, text);
            let keywords = self.keyword_score(language, text);
            let stat = statistical.get(&language).copied().unwrap_or(0.0);
            let score =
                PATTERN_WEIGHT * pattern + KEYWORD_WEIGHT * keywords + STATISTICAL_WEIGHT * stat;
            if score > 0.0 && best.map_or(true, |(_, top)| score > top) {
                best = Some((language, score));
            }
        }

        match best {
            Some((language, score)) => DetectionResult::new(
                language,
                score.min(MAX_WEIGHTED_CONFIDENCE),
                DetectionMethod::Weighted,
            ),
            None => DetectionResult::new(LangCode::Ja, 0.3, DetectionMethod::Fallback),
        }
    }

    fn pattern_score(&self, language: LangCode, text: &str) -> f32 {
        let groups = match language {
            LangCode::Ja => JA_PATTERNS,
            LangCode::Ko => KO_PATTERNS,
            LangCode::Zh => ZH_PATTERNS,
            LangCode::ZhTw => ZH_TW_PATTERNS,
            LangCode::En => EN_PATTERNS,
        };

        let length = text.chars().count().max(1) as f32;
        let mut score = 0.0_f32;
        let mut fired = 0;
        for group in groups {
            let hits = match group.kind {
                PatternKind::Glyphs(set) => count_in_set(text, set),
                PatternKind::Hangul => text.chars().filter(|ch| script::is_hangul(*ch)).count(),
                PatternKind::AsciiLetters => text.chars().filter(char::is_ascii_alphabetic).count(),
                PatternKind::EnglishMarkers => self.english_marker_hits(text),
            };
            if hits > 0 {
                score += (hits as f32 / length * 10.0).min(1.0) * group.weight;
                fired += 1;
            }
        }
        if fired > 1 {
            score *= MULTI_PATTERN_BONUS;
        }
        score.min(1.0)
    }

    fn keyword_score(&self, language: LangCode, text: &str) -> f32 {
        let Some(keywords) = self.keywords.get(&language) else {
            return 0.0;
        };
        let lower = text.to_lowercase();
        let hits = if language == LangCode::En {
            let words: HashSet<&str> = english_words(&lower).collect();
            keywords
                .iter()
                .filter(|keyword| words.contains(keyword.as_str()))
                .count()
        } else {
            keywords
                .iter()
                .filter(|keyword| lower.contains(keyword.as_str()))
                .count()
        };
        (hits as f32 / 3.0).min(1.0)
    }

    fn english_marker_hits(&self, text: &str) -> usize {
        let lower = text.to_lowercase();
        english_words(&lower)
            .filter(|word| self.english_markers.contains(*word))
            .count()
    }
}

fn english_words(lower: &str) -> impl Iterator<Item = &str> {
    lower
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '\''))
        .map(|word| word.trim_matches(|ch| ch == '-' || ch == '\''))
        .filter(|word| !word.is_empty())
}

fn short_text(text: &str) -> DetectionResult {
    if script::traditional_glyphs(text) > 0 {
        DetectionResult::new(LangCode::ZhTw, 0.8, DetectionMethod::ShortTraditional)
    } else if script::simplified_glyphs(text) > 0 {
        DetectionResult::new(LangCode::Zh, 0.8, DetectionMethod::ShortSimplified)
    } else if is_ascii_wordlike(text) {
        DetectionResult::new(LangCode::En, 0.6, DetectionMethod::ShortEnglish)
    } else {
        DetectionResult::new(LangCode::Ja, 0.3, DetectionMethod::ShortDefault)
    }
}

/// Overrides applied after every method.
fn post_process(text: &str, mut result: DetectionResult) -> DetectionResult {
    if has_kana(text) {
        result.language = LangCode::Ja;
        result.confidence = result.confidence.max(0.9);
        return result;
    }
    if has_hangul(text) {
        result.language = LangCode::Ko;
        result.confidence = result.confidence.max(0.9);
        return result;
    }
    if result.language == LangCode::Ko && has_han(text) {
        result.language = LangCode::Ja;
        result.confidence = (result.confidence * 0.8).max(0.5);
        return result;
    }
    if result.language.is_chinese() {
        let traditional = script::traditional_glyphs(text);
        let simplified = script::simplified_glyphs(text);
        result.language = if traditional > simplified {
            LangCode::ZhTw
        } else {
            LangCode::Zh
        };
    }
    result
}
