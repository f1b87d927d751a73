use std::path::PathBuf;
use std::sync::Arc;

use tabi_agents::{build_pipeline, Pipeline, PipelineSettings, StatisticalBackend};
use tabi_core::{
    ChatInput, Degradation, DetectionMethod, LangCode, LocationKind, LocationRecord, ResponseType,
};
use tabi_observability::AppMetrics;
use tabi_storage::CompanyDirectory;

fn faq_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../faq")
}

fn pipeline(faq: bool, directory: CompanyDirectory) -> Pipeline {
    let settings = PipelineSettings {
        faq_dir: faq.then(faq_dir),
        statistical: StatisticalBackend::Whatlang,
        ..PipelineSettings::default()
    };
    build_pipeline(&settings, Arc::new(directory), AppMetrics::shared()).unwrap()
}

fn kyoto() -> LocationRecord {
    LocationRecord {
        city: "京都市".to_string(),
        prefecture: "京都府".to_string(),
        region: String::new(),
        postal_code: None,
        address: None,
        kind: LocationKind::Database,
    }
}

fn turn(text: &str, company_id: &str, session_id: Option<&str>) -> ChatInput {
    ChatInput {
        text: text.to_string(),
        company_id: company_id.to_string(),
        session_id: session_id.map(str::to_string),
        ..ChatInput::default()
    }
}

#[test]
fn pivot_faq_answer_is_returned_unchanged() {
    let pipeline = pipeline(true, CompanyDirectory::new());
    let outcome = pipeline
        .orchestrator
        .handle(turn("チェックインは何時からですか", "demo-company", None));

    assert_eq!(outcome.envelope.detected_language, LangCode::Ja);
    assert_eq!(outcome.envelope.response_type, ResponseType::FaqEnhanced);
    assert!(outcome.envelope.answer.starts_with("チェックインは15時からです。"));
    assert!(!outcome.back_translated);
    assert!(!outcome.envelope.needs_human_escalation);
}

#[test]
fn session_language_carries_to_the_next_turn() {
    let pipeline = pipeline(false, CompanyDirectory::new());
    let first = pipeline.orchestrator.handle(turn(
        "체크인은 몇 시부터인가요?",
        "demo-company",
        Some("guest-42"),
    ));
    assert_eq!(first.detection.language, LangCode::Ko);

    let second = pipeline
        .orchestrator
        .handle(turn("네 감사합니다", "demo-company", Some("guest-42")));
    assert_eq!(second.detection.language, LangCode::Ko);
    assert_eq!(second.detection.method, DetectionMethod::SessionHint);
    assert_eq!(second.envelope.detected_language, LangCode::Ko);
}

#[test]
fn session_hint_yields_to_a_different_script() {
    let pipeline = pipeline(false, CompanyDirectory::new());
    pipeline.orchestrator.handle(turn(
        "체크인은 몇 시부터인가요?",
        "demo-company",
        Some("guest-7"),
    ));

    let outcome = pipeline.orchestrator.handle(turn(
        "Thank you so much, where is the station?",
        "demo-company",
        Some("guest-7"),
    ));
    assert_eq!(outcome.detection.language, LangCode::En);
    assert_ne!(outcome.detection.method, DetectionMethod::SessionHint);
}

#[test]
fn untranslatable_guest_text_is_flagged_as_degraded() {
    let pipeline = pipeline(false, CompanyDirectory::new());
    let outcome = pipeline.orchestrator.handle(turn(
        "체크인은 몇 시부터인가요?",
        "demo-company",
        None,
    ));

    assert!(outcome
        .degradations
        .contains(&Degradation::TranslationUnavailable));
    assert_eq!(outcome.envelope.detected_language, LangCode::Ko);
}

#[test]
fn stored_company_location_drives_tourism_links() {
    let directory = CompanyDirectory::new();
    directory.insert("kyoto-inn", kyoto());
    let pipeline = pipeline(false, directory);

    let outcome = pipeline
        .orchestrator
        .handle(turn("観光スポットを教えて", "kyoto-inn", None));

    assert_eq!(outcome.envelope.response_type, ResponseType::Tourism);
    assert!(outcome.envelope.location_enhanced);
    assert!(outcome.envelope.answer.contains("京都市"));
    assert!(!outcome.envelope.specialized_links.is_empty());
    assert_eq!(
        outcome.location.as_ref().map(|candidate| candidate.location.kind),
        Some(LocationKind::Database)
    );
}

#[test]
fn unmatched_question_escalates_to_staff() {
    let pipeline = pipeline(false, CompanyDirectory::new());
    let outcome = pipeline
        .orchestrator
        .handle(turn("部屋の鍵をなくしてしまいました", "demo-company", None));

    assert_eq!(outcome.envelope.response_type, ResponseType::Unknown);
    assert!(outcome.envelope.needs_human_escalation);
    assert_eq!(outcome.envelope.confidence, 0.0);
    assert_eq!(pipeline.orchestrator.metrics().snapshot().escalations_total, 1);
}

#[test]
fn repeated_text_hits_detection_cache() {
    let pipeline = pipeline(false, CompanyDirectory::new());
    pipeline
        .orchestrator
        .handle(turn("朝食は何時からですか", "demo-company", None));
    let outcome = pipeline
        .orchestrator
        .handle(turn("朝食は何時からですか", "demo-company", None));

    assert!(outcome.detection.cached);
    assert!(pipeline.orchestrator.cache_report().detection.hits >= 1);
}

#[test]
fn kanji_only_japanese_is_answered_as_japanese() {
    let pipeline = pipeline(true, CompanyDirectory::new());
    for text in ["営業時間", "駐車場"] {
        let outcome = pipeline.orchestrator.handle(turn(text, "demo-company", None));
        assert_eq!(outcome.detection.language, LangCode::Ja, "{text}");
        assert_eq!(outcome.envelope.detected_language, LangCode::Ja, "{text}");
        assert!(!outcome
            .degradations
            .contains(&Degradation::TranslationUnavailable));
    }
}

#[test]
fn chinese_question_with_latin_brand_stays_chinese() {
    let pipeline = pipeline(false, CompanyDirectory::new());
    let simplified = pipeline
        .orchestrator
        .handle(turn("WiFi密码是什么?", "demo-company", None));
    assert_eq!(simplified.detection.language, LangCode::Zh);
    assert_ne!(simplified.detection.method, DetectionMethod::EnglishRecheck);

    let traditional = pipeline
        .orchestrator
        .handle(turn("WiFi密碼是什麼?", "demo-company", None));
    assert_eq!(traditional.detection.language, LangCode::ZhTw);
}
