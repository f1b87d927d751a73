//! Two-tier translation with term protection, a quality gate, bounded
//! attempts and a result cache.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tabi_core::script::has_kana;
use tabi_core::{
    BoundedCache, CacheStats, Degradation, LangCode, Lexicon, TranslationEngine, TurnContext,
    PIVOT_LANGUAGE,
};
use tracing::{debug, info, warn};

use crate::protect::{ProtectedText, TermProtector};
use crate::quality::QualityGate;

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

pub type TranslationCache = BoundedCache<(String, LangCode), String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationQuality {
    /// Passed the quality gate.
    Accepted,
    /// Every attempt was rejected; the last output is returned anyway.
    LowQuality,
    /// No engine produced output; the original text is returned.
    Passthrough,
    /// Nothing to do: empty text or source equals target.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslationOutcome {
    pub text: String,
    pub quality: TranslationQuality,
    pub engine: Option<&'static str>,
    pub cached: bool,
    pub attempts: usize,
    pub fell_back: bool,
    pub timed_out: bool,
}

impl TranslationOutcome {
    fn unchanged(text: &str, quality: TranslationQuality) -> Self {
        Self {
            text: text.to_string(),
            quality,
            engine: None,
            cached: false,
            attempts: 0,
            fell_back: false,
            timed_out: false,
        }
    }

    pub fn degradations(&self) -> Vec<Degradation> {
        let mut out = Vec::new();
        match self.quality {
            TranslationQuality::LowQuality => out.push(Degradation::TranslationQualityRejected),
            TranslationQuality::Passthrough => out.push(Degradation::TranslationUnavailable),
            TranslationQuality::Accepted | TranslationQuality::Skipped => {}
        }
        if self.timed_out {
            out.push(Degradation::ExternalServiceTimeout);
        }
        out
    }
}

pub struct TranslationOrchestrator {
    primary: Option<Arc<dyn TranslationEngine>>,
    fallback: Option<Arc<dyn TranslationEngine>>,
    primary_available: OnceCell<bool>,
    cache: Arc<TranslationCache>,
    protector: TermProtector,
    gate: QualityGate,
    max_attempts: usize,
}

impl TranslationOrchestrator {
    pub fn new(
        lexicon: &Lexicon,
        primary: Option<Arc<dyn TranslationEngine>>,
        fallback: Option<Arc<dyn TranslationEngine>>,
        cache: Arc<TranslationCache>,
        max_attempts: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            primary_available: OnceCell::new(),
            cache,
            protector: TermProtector::new(&lexicon.place_names),
            gate: QualityGate::new(&lexicon.api_error_phrases),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Best-effort translation; the original text comes back when nothing works.
    pub fn translate(&self, text: &str, target: LangCode, source: Option<LangCode>) -> String {
        self.translate_with(&TurnContext::new(), text, target, source)
            .text
    }

    pub fn translate_with(
        &self,
        context: &TurnContext,
        text: &str,
        target: LangCode,
        source: Option<LangCode>,
    ) -> TranslationOutcome {
        if text.trim().is_empty() || source == Some(target) {
            return TranslationOutcome::unchanged(text, TranslationQuality::Skipped);
        }

        let key = (text.to_string(), target);
        if let Some(hit) = self.cache.get(&key) {
            return TranslationOutcome {
                text: hit,
                quality: TranslationQuality::Accepted,
                engine: None,
                cached: true,
                attempts: 0,
                fell_back: false,
                timed_out: false,
            };
        }

        let chain = self.engine_chain();
        if chain.is_empty() {
            debug!(%target, "no translation engine configured");
            return TranslationOutcome::unchanged(text, TranslationQuality::Passthrough);
        }

        let protected = if is_outbound(text, source) {
            self.protector.protect(text, target)
        } else {
            ProtectedText::unprotected(text)
        };

        let mut engine_idx = 0;
        let mut attempts = 0;
        let mut last_output: Option<(String, &'static str)> = None;
        let mut timed_out = false;
        let skipped_primary = self.primary.is_some() && !self.primary_available();
        let fell_back = |engine_idx: usize| skipped_primary || (engine_idx > 0 && chain.len() > 1);

        while attempts < self.max_attempts && engine_idx < chain.len() {
            let engine = &chain[engine_idx];
            if let Err(err) = context.ensure_active(engine.name()) {
                debug!(error = %err, attempts, "translation abandoned");
                return TranslationOutcome {
                    attempts,
                    timed_out,
                    fell_back: fell_back(engine_idx),
                    ..TranslationOutcome::unchanged(text, TranslationQuality::Passthrough)
                };
            }
            attempts += 1;

            match engine.translate(&protected.text, target, source) {
                Ok(raw) => {
                    let restored = protected.restore(&raw);
                    match self.gate.check(text, &restored, source, target) {
                        Ok(()) => {
                            self.cache.insert(key, restored.clone());
                            let fell_back = fell_back(engine_idx);
                            info!(
                                engine = engine.name(),
                                %target,
                                attempts,
                                fell_back,
                                "translation accepted"
                            );
                            return TranslationOutcome {
                                text: restored,
                                quality: TranslationQuality::Accepted,
                                engine: Some(engine.name()),
                                cached: false,
                                attempts,
                                fell_back,
                                timed_out,
                            };
                        }
                        Err(rejection) => {
                            debug!(engine = engine.name(), attempt = attempts, %rejection, "translation rejected");
                            last_output = Some((restored, engine.name()));
                        }
                    }
                }
                Err(err) => {
                    timed_out |= err.is_timeout();
                    warn!(engine = engine.name(), error = %err, "translation engine failed, switching");
                    engine_idx += 1;
                }
            }
        }

        match last_output {
            Some((output, engine)) => {
                warn!(engine, %target, attempts, "returning low-quality translation");
                TranslationOutcome {
                    text: output,
                    quality: TranslationQuality::LowQuality,
                    engine: Some(engine),
                    cached: false,
                    attempts,
                    fell_back: fell_back(engine_idx),
                    timed_out,
                }
            }
            None => {
                warn!(%target, attempts, "all translation engines failed, returning original text");
                TranslationOutcome {
                    attempts,
                    timed_out,
                    fell_back: fell_back(engine_idx),
                    ..TranslationOutcome::unchanged(text, TranslationQuality::Passthrough)
                }
            }
        }
    }

    /// Translates a pivot-language response for the guest while keeping
    /// protected lines in place. The translatable lines go to the engine as
    /// one block; if the engine changes the line count the whole block lands
    /// at the first translatable position.
    pub fn translate_back(
        &self,
        context: &TurnContext,
        response: &str,
        target: LangCode,
    ) -> BackTranslation {
        if target == PIVOT_LANGUAGE {
            return BackTranslation {
                text: response.to_string(),
                outcome: None,
            };
        }

        let lines: Vec<&str> = response.split('\n').collect();
        let translatable: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !is_protected_line(line))
            .map(|(idx, _)| idx)
            .collect();
        if translatable.is_empty() {
            return BackTranslation {
                text: response.to_string(),
                outcome: None,
            };
        }

        let block = translatable
            .iter()
            .map(|&idx| lines[idx])
            .collect::<Vec<_>>()
            .join("\n");
        let outcome = self.translate_with(context, &block, target, Some(PIVOT_LANGUAGE));
        let translated: Vec<&str> = outcome.text.split('\n').collect();

        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        if translated.len() == translatable.len() {
            let mut replacements = translated.iter();
            for (idx, line) in lines.iter().enumerate() {
                if translatable.contains(&idx) {
                    out.push(replacements.next().copied().unwrap_or(line).to_string());
                } else {
                    out.push((*line).to_string());
                }
            }
        } else {
            debug!(
                expected = translatable.len(),
                got = translated.len(),
                "line count changed in translation, placing block at first slot"
            );
            let first = translatable[0];
            for (idx, line) in lines.iter().enumerate() {
                if idx == first {
                    out.push(outcome.text.clone());
                } else if !translatable.contains(&idx) {
                    out.push((*line).to_string());
                }
            }
        }

        BackTranslation {
            text: out.join("\n"),
            outcome: Some(outcome),
        }
    }

    /// Lazily validated once per orchestrator; the answer is kept for its lifetime.
    pub fn primary_available(&self) -> bool {
        let Some(primary) = self.primary.as_ref() else {
            return false;
        };
        *self.primary_available.get_or_init(|| match primary.check_available() {
            Ok(()) => {
                info!(engine = primary.name(), "primary translation engine available");
                true
            }
            Err(err) => {
                warn!(engine = primary.name(), error = %err, "primary translation engine unavailable");
                false
            }
        })
    }

    pub fn primary_status(&self) -> Option<bool> {
        self.primary_available.get().copied()
    }

    pub fn has_engine(&self) -> bool {
        self.primary.is_some() || self.fallback.is_some()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    fn engine_chain(&self) -> Vec<Arc<dyn TranslationEngine>> {
        let mut chain = Vec::with_capacity(2);
        if self.primary_available() {
            if let Some(primary) = &self.primary {
                chain.push(Arc::clone(primary));
            }
        }
        if let Some(fallback) = &self.fallback {
            chain.push(Arc::clone(fallback));
        }
        chain
    }
}

/// Protection only applies to pivot-language text going out to a guest.
fn is_outbound(text: &str, source: Option<LangCode>) -> bool {
    match source {
        Some(source) => source == PIVOT_LANGUAGE,
        None => has_kana(text),
    }
}

const PROTECTED_LINE_PREFIXES: [&str; 6] = ["📍", "🔗", "🗺", "🕒", "⭐", "http"];

/// Lines that must reach the guest byte-for-byte: links, link bullets,
/// location and rating markers, and blank separators.
pub fn is_protected_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.contains("](") {
        return true;
    }
    if PROTECTED_LINE_PREFIXES
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
    {
        return true;
    }
    let bullet = trimmed.starts_with('•')
        || trimmed.starts_with("- ")
        || trimmed.starts_with("* ");
    bullet && (trimmed.contains("http://") || trimmed.contains("https://"))
}

#[derive(Debug, Clone, Serialize)]
pub struct BackTranslation {
    pub text: String,
    pub outcome: Option<TranslationOutcome>,
}
