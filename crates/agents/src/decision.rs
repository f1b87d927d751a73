//! Whether a composed answer still needs to go through back-translation.

use once_cell::sync::Lazy;
use regex::Regex;
use tabi_core::script::{self, is_hangul, is_hiragana};
use tabi_core::LangCode;

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]\([^)]*\)").expect("valid markdown link regex"));
static BARE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("valid url regex"));
static ASCII_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z]{2,}").expect("valid ascii word regex"));

pub const MIN_PIVOT_SIGNAL: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageSignals {
    pub pivot: usize,
    pub target: usize,
}

impl LanguageSignals {
    pub fn pivot_dominates(&self) -> bool {
        self.pivot >= MIN_PIVOT_SIGNAL && self.pivot > self.target
    }
}

pub struct BackTranslationPolicy {
    pivot_nouns: Vec<String>,
}

impl BackTranslationPolicy {
    pub fn new(pivot_nouns: &[String]) -> Self {
        Self {
            pivot_nouns: pivot_nouns
                .iter()
                .filter(|noun| !noun.is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Counts pivot and target markers outside links and URLs.
    pub fn signals(&self, answer: &str, target: LangCode) -> LanguageSignals {
        let without_links = MARKDOWN_LINK.replace_all(answer, " ");
        let text = BARE_URL.replace_all(&without_links, " ");

        let hiragana = text.chars().filter(|ch| is_hiragana(*ch)).count();
        let nouns: usize = self
            .pivot_nouns
            .iter()
            .map(|noun| text.matches(noun.as_str()).count())
            .sum();

        let target_signal = match target {
            LangCode::Ja => 0,
            LangCode::En => 2 * ASCII_WORD.find_iter(&text).count(),
            LangCode::Ko => text.chars().filter(|ch| is_hangul(*ch)).count(),
            LangCode::Zh => 2 * script::simplified_glyphs(&text),
            LangCode::ZhTw => 2 * script::traditional_glyphs(&text),
        };

        LanguageSignals {
            pivot: hiragana + 2 * nouns,
            target: target_signal,
        }
    }

    pub fn should_translate(&self, answer: &str, target: LangCode) -> bool {
        if target.is_pivot() || answer.trim().is_empty() {
            return false;
        }
        self.signals(answer, target).pivot_dominates()
    }
}
