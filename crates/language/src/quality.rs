use tabi_core::script::{self, ScriptProfile};
use tabi_core::LangCode;
use thiserror::Error;

pub const MIN_LENGTH_RATIO: f32 = 0.2;
pub const MAX_LENGTH_RATIO: f32 = 5.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QualityRejection {
    #[error("translation is empty")]
    Empty,
    #[error("translation is identical to the source")]
    Untranslated,
    #[error("length ratio {ratio:.2} outside accepted range")]
    LengthRatio { ratio: f32 },
    #[error("no {target} script markers in translation")]
    MissingTargetScript { target: LangCode },
    #[error("translation looks like an API error: {phrase}")]
    ApiErrorPhrase { phrase: String },
}

/// Checks run on every engine attempt before a translation is accepted.
#[derive(Debug, Clone)]
pub struct QualityGate {
    error_phrases: Vec<String>,
}

impl QualityGate {
    pub fn new(error_phrases: &[String]) -> Self {
        Self {
            error_phrases: error_phrases.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    pub fn check(
        &self,
        original: &str,
        translated: &str,
        source: Option<LangCode>,
        target: LangCode,
    ) -> Result<(), QualityRejection> {
        let translated_trimmed = translated.trim();
        if translated_trimmed.is_empty() {
            return Err(QualityRejection::Empty);
        }

        let source_differs = source.map_or(true, |source| source != target);
        if source_differs
            && translated_trimmed == original.trim()
            && !is_bare_proper_noun(original)
        {
            return Err(QualityRejection::Untranslated);
        }

        let original_len = original.trim().chars().count().max(1) as f32;
        let ratio = translated_trimmed.chars().count() as f32 / original_len;
        if !(MIN_LENGTH_RATIO..=MAX_LENGTH_RATIO).contains(&ratio) {
            return Err(QualityRejection::LengthRatio { ratio });
        }

        // text with no letters at all (numbers, emoji) has nothing to check
        if ScriptProfile::of(original).letters() > 0 && !has_target_markers(translated, target) {
            return Err(QualityRejection::MissingTargetScript { target });
        }

        let lower = translated_trimmed.to_lowercase();
        if let Some(phrase) = self
            .error_phrases
            .iter()
            .find(|phrase| lower.contains(phrase.as_str()))
        {
            return Err(QualityRejection::ApiErrorPhrase {
                phrase: phrase.clone(),
            });
        }

        Ok(())
    }
}

pub fn has_target_markers(text: &str, target: LangCode) -> bool {
    let profile = ScriptProfile::of(text);
    match target {
        LangCode::Ja => profile.kana() > 0 || profile.han > 0,
        LangCode::Ko => profile.hangul > 0,
        LangCode::En => profile.latin > 0,
        LangCode::Zh | LangCode::ZhTw => profile.han > 0,
    }
}

/// Single capitalised word or short katakana/Han run with no sentence punctuation.
pub fn is_bare_proper_noun(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().any(|ch| "。、？！?!.,".contains(ch)) {
        return false;
    }
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() > 3 {
        return false;
    }
    let latin_proper = words.iter().all(|word| {
        word.chars().next().is_some_and(|ch| ch.is_ascii_uppercase())
            && word.chars().all(|ch| ch.is_ascii_alphabetic() || ch == '-')
    });
    let cjk_name = words.len() == 1
        && trimmed.chars().count() <= 8
        && trimmed
            .chars()
            .all(|ch| script::is_katakana(ch) || script::is_han(ch));
    latin_proper || cjk_name
}
