use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tabi_core::{
    clamp_unit, normalize_text, BoundedCache, CacheStats, ChatInput, Degradation, DetectionMethod,
    DetectionResult, EscalationContext, EscalationNotifier, FaqAnswer, FaqLookup,
    IntentClassification, IntentClassifier, LangCode, Lexicon, LocationCandidate, PlacesSearch,
    ResponseEnvelope, ResponseType, TurnContext, PIVOT_LANGUAGE,
};
use tabi_language::{LanguageDetector, TranslationOrchestrator, TranslationOutcome, TranslationQuality};
use tabi_location::LocationResolver;
use tabi_observability::AppMetrics;
use tracing::{debug, info, instrument, warn};

use crate::decision::BackTranslationPolicy;
use crate::handlers::{HandlerReply, Handlers, TurnFacts};
use crate::links::LinkBuilder;

pub const SESSION_HINT_CONFIDENCE: f32 = 0.9;
pub const ENGLISH_RECHECK_FLOOR: f32 = 0.7;
pub const DEFAULT_SESSION_CAPACITY: usize = 1000;

pub type SessionLanguages = BoundedCache<String, LangCode>;

/// External services the orchestrator reaches through handlers or directly.
pub struct Collaborators {
    pub places: Arc<dyn PlacesSearch>,
    pub faq: Arc<dyn FaqLookup>,
    pub notifier: Arc<dyn EscalationNotifier>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub envelope: ResponseEnvelope,
    pub detection: DetectionResult,
    pub pivot_text: String,
    pub intent: Option<IntentClassification>,
    pub location: Option<LocationCandidate>,
    pub faq_confidence: f32,
    pub back_translated: bool,
    pub degradations: Vec<Degradation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub detection: CacheStats,
    pub translation: CacheStats,
    pub sessions: CacheStats,
}

pub struct ResponseOrchestrator {
    detector: Arc<LanguageDetector>,
    translator: Arc<TranslationOrchestrator>,
    resolver: Arc<LocationResolver>,
    classifier: IntentClassifier,
    faq: Arc<dyn FaqLookup>,
    notifier: Arc<dyn EscalationNotifier>,
    handlers: Handlers,
    policy: BackTranslationPolicy,
    sessions: Arc<SessionLanguages>,
    metrics: Arc<AppMetrics>,
}

impl ResponseOrchestrator {
    pub fn new(
        lexicon: &Lexicon,
        detector: Arc<LanguageDetector>,
        translator: Arc<TranslationOrchestrator>,
        resolver: Arc<LocationResolver>,
        collaborators: Collaborators,
        sessions: Arc<SessionLanguages>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let links = LinkBuilder::new(resolver.shared_gazetteer());
        Self {
            detector,
            translator,
            classifier: IntentClassifier::new(lexicon.intent.clone()),
            faq: collaborators.faq,
            notifier: collaborators.notifier,
            handlers: Handlers::new(collaborators.places, links),
            policy: BackTranslationPolicy::new(&lexicon.pivot_domain_nouns),
            resolver,
            sessions,
            metrics,
        }
    }

    pub fn detector(&self) -> &LanguageDetector {
        &self.detector
    }

    pub fn translator(&self) -> &TranslationOrchestrator {
        &self.translator
    }

    pub fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn metrics(&self) -> &AppMetrics {
        &self.metrics
    }

    pub fn cache_report(&self) -> CacheReport {
        CacheReport {
            detection: self.detector.cache_stats(),
            translation: self.translator.cache_stats(),
            sessions: self.sessions.stats(),
        }
    }

    pub fn handle(&self, input: ChatInput) -> TurnOutcome {
        self.handle_with(&TurnContext::new(), input)
    }

    #[instrument(skip(self, context, input), fields(company_id = %input.company_id))]
    pub fn handle_with(&self, context: &TurnContext, input: ChatInput) -> TurnOutcome {
        let started = Instant::now();
        self.metrics.inc_request();
        let mut degradations = Vec::new();

        let text = normalize_text(&input.text);
        if text.is_empty() {
            let language = self.session_hint(&input).unwrap_or(PIVOT_LANGUAGE);
            self.metrics.observe_latency(started.elapsed());
            return TurnOutcome {
                envelope: ResponseEnvelope {
                    answer: empty_prompt(language).to_string(),
                    confidence: 0.0,
                    response_type: ResponseType::Unknown,
                    specialized_links: Vec::new(),
                    needs_human_escalation: false,
                    detected_language: language,
                    location_enhanced: false,
                },
                detection: DetectionResult::new(language, 0.0, DetectionMethod::Empty),
                pivot_text: String::new(),
                intent: None,
                location: None,
                faq_confidence: 0.0,
                back_translated: false,
                degradations,
            };
        }

        let detection = self.detect_language(&text, &input);
        let language = detection.language;
        if detection.cached {
            self.metrics.inc_detection_cache_hit();
        }
        if detection.method == DetectionMethod::Fallback {
            push_unique(&mut degradations, Degradation::DetectionAmbiguous);
        }
        if let Some(session_id) = input.session_id.as_deref() {
            self.sessions.insert(session_id.to_string(), language);
        }

        let pivot_text = if language.is_pivot() {
            text.clone()
        } else {
            let outcome = self
                .translator
                .translate_with(context, &text, PIVOT_LANGUAGE, Some(language));
            self.record_translation(&outcome, &mut degradations);
            outcome.text
        };

        let location = self.resolver.resolve_with(
            context,
            input.manual_location.as_deref(),
            input.gps_coords,
            &input.company_id,
        );
        if location.is_none() {
            self.metrics.inc_location_unresolved();
            push_unique(&mut degradations, Degradation::LocationUnresolved);
        }

        let intent = self.classifier.classify(&pivot_text);
        let faq = self.lookup_faq(context, &pivot_text, &input.company_id, &mut degradations);
        let route = intent.route(faq.confidence_hint);
        debug!(?route, faq_confidence = faq.confidence_hint, "dispatching turn");

        let facts = TurnFacts {
            text: &pivot_text,
            intent: &intent,
            faq: &faq,
            location: location.as_ref().map(|candidate| &candidate.location),
            language,
        };
        let reply = self.handlers.dispatch(context, route, &facts);
        for degradation in &reply.degradations {
            push_unique(&mut degradations, *degradation);
        }

        if reply.escalate {
            self.metrics.inc_escalation();
            push_unique(&mut degradations, Degradation::EscalationRequired);
            if reply.response_type == ResponseType::Unknown {
                self.notify_staff(context, &pivot_text, &input.company_id, language);
            }
        }

        let HandlerReply {
            answer,
            confidence,
            response_type,
            links,
            mut escalate,
            location_enhanced,
            ..
        } = reply;

        let (mut answer, back_translated) = self.localize(context, answer, language, &mut degradations);

        if context.is_cancelled() {
            self.metrics.inc_cancelled();
            warn!(language = %language, "turn cancelled, answering with apology");
            answer = apology(language).to_string();
            escalate = true;
        }

        let envelope = ResponseEnvelope {
            answer,
            confidence: clamp_unit(confidence),
            response_type,
            specialized_links: links,
            needs_human_escalation: escalate,
            detected_language: language,
            location_enhanced,
        };

        self.metrics.observe_latency(started.elapsed());
        info!(
            language = %language,
            method = %detection.method_label(),
            response_type = ?envelope.response_type,
            confidence = envelope.confidence,
            escalate = envelope.needs_human_escalation,
            back_translated,
            degradations = ?degradations,
            "turn completed"
        );

        TurnOutcome {
            envelope,
            detection,
            pivot_text,
            intent: Some(intent),
            location,
            faq_confidence: faq.confidence_hint,
            back_translated,
            degradations,
        }
    }

    /// Session hint first when the text agrees with it, then full detection
    /// with an English recheck.
    pub fn detect_language(&self, text: &str, input: &ChatInput) -> DetectionResult {
        if let Some(hint) = self.session_hint(input).filter(|hint| !hint.is_pivot()) {
            if self.detector.hint_consistent(hint, text) {
                return DetectionResult::new(
                    hint,
                    SESSION_HINT_CONFIDENCE,
                    DetectionMethod::SessionHint,
                );
            }
            debug!(hint = %hint, "session hint inconsistent with text, detecting");
        }

        let detected = self.detector.detect(text);
        if detected.language != LangCode::En && self.detector.looks_english(text) {
            return DetectionResult::new(
                LangCode::En,
                detected.confidence.max(ENGLISH_RECHECK_FLOOR),
                DetectionMethod::EnglishRecheck,
            );
        }
        detected
    }

    fn session_hint(&self, input: &ChatInput) -> Option<LangCode> {
        input.session_previous_language.or_else(|| {
            input
                .session_id
                .as_ref()
                .and_then(|session_id| self.sessions.get(session_id))
        })
    }

    fn lookup_faq(
        &self,
        context: &TurnContext,
        text: &str,
        company_id: &str,
        degradations: &mut Vec<Degradation>,
    ) -> FaqAnswer {
        let result = context
            .ensure_active("faq")
            .and_then(|()| self.faq.lookup(text, company_id));
        match result {
            Ok(answer) => FaqAnswer {
                confidence_hint: clamp_unit(answer.confidence_hint),
                answer: answer.answer,
            },
            Err(err) => {
                warn!(company_id, error = %err, "faq lookup failed");
                if err.is_timeout() {
                    push_unique(degradations, Degradation::ExternalServiceTimeout);
                }
                FaqAnswer {
                    answer: String::new(),
                    confidence_hint: 0.0,
                }
            }
        }
    }

    fn notify_staff(&self, context: &TurnContext, text: &str, company_id: &str, language: LangCode) {
        if context.is_cancelled() {
            return;
        }
        let escalation = EscalationContext {
            detected_language: language,
            reason: "unanswered_query".to_string(),
            timestamp: Utc::now(),
        };
        if let Err(err) = self.notifier.notify(text, company_id, &escalation) {
            warn!(company_id, error = %err, "escalation notification failed");
        }
    }

    /// Back-translates when the answer is still mostly pivot text. If no
    /// engine works the pivot answer is kept behind a localized note.
    fn localize(
        &self,
        context: &TurnContext,
        answer: String,
        language: LangCode,
        degradations: &mut Vec<Degradation>,
    ) -> (String, bool) {
        if !self.policy.should_translate(&answer, language) {
            return (answer, false);
        }

        let back = self.translator.translate_back(context, &answer, language);
        match back.outcome {
            Some(outcome) => {
                self.record_translation(&outcome, degradations);
                if outcome.quality == TranslationQuality::Passthrough {
                    (format!("{}\n\n{}", translation_unavailable_note(language), answer), false)
                } else {
                    (back.text, true)
                }
            }
            None => (back.text, false),
        }
    }

    fn record_translation(&self, outcome: &TranslationOutcome, degradations: &mut Vec<Degradation>) {
        if outcome.cached {
            self.metrics.inc_translation_cache_hit();
        }
        if outcome.fell_back {
            self.metrics.inc_engine_fallback();
        }
        match outcome.quality {
            TranslationQuality::LowQuality => self.metrics.inc_low_quality(),
            TranslationQuality::Passthrough => self.metrics.inc_passthrough(),
            TranslationQuality::Accepted | TranslationQuality::Skipped => {}
        }
        for degradation in outcome.degradations() {
            push_unique(degradations, degradation);
        }
    }
}

fn push_unique(degradations: &mut Vec<Degradation>, degradation: Degradation) {
    if !degradations.contains(&degradation) {
        degradations.push(degradation);
    }
}

pub fn apology(language: LangCode) -> &'static str {
    match language {
        LangCode::Ja => "申し訳ございません。ただいまご質問にお答えできません。スタッフが確認いたしますので、しばらくお待ちください。",
        LangCode::En => "We're sorry, we can't answer your question right now. A staff member will follow up with you shortly.",
        LangCode::Ko => "죄송합니다. 지금은 질문에 답변드릴 수 없습니다. 직원이 확인 후 안내해 드리겠습니다.",
        LangCode::Zh => "非常抱歉，目前无法回答您的问题。工作人员会尽快与您联系。",
        LangCode::ZhTw => "非常抱歉，目前無法回答您的問題。工作人員會盡快與您聯繫。",
    }
}

fn translation_unavailable_note(language: LangCode) -> &'static str {
    match language {
        LangCode::Ja => "",
        LangCode::En => "(Translation is temporarily unavailable, so the answer below is in Japanese.)",
        LangCode::Ko => "(현재 번역을 이용할 수 없어 아래 답변은 일본어로 안내됩니다.)",
        LangCode::Zh => "（翻译功能暂时无法使用，以下为日文回答。）",
        LangCode::ZhTw => "（翻譯功能暫時無法使用，以下為日文回答。）",
    }
}

fn empty_prompt(language: LangCode) -> &'static str {
    match language {
        LangCode::Ja => "ご質問内容を入力してください。",
        LangCode::En => "Please type your question.",
        LangCode::Ko => "질문 내용을 입력해 주세요.",
        LangCode::Zh => "请输入您的问题。",
        LangCode::ZhTw => "請輸入您的問題。",
    }
}
