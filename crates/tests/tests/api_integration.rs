use std::path::PathBuf;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tabi_api::{build_app_with, Settings};
use tower::ServiceExt;

const API_KEY: &str = "test-tabi-key";

fn faq_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../faq")
}

fn settings() -> Settings {
    let mut settings = Settings {
        api_key: API_KEY.to_string(),
        ..Settings::default()
    };
    settings.pipeline.faq_dir = Some(faq_dir());
    settings
}

async fn app() -> Router {
    build_app_with(settings()).await.expect("app should build")
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let response = app()
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["capabilities"]["primary_translation"], false);
    assert!(parsed["capabilities"]["faq"]["entries"].as_u64().unwrap() >= 7);
}

#[tokio::test]
async fn chat_requires_api_key() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "text": "チェックインは何時からですか", "company_id": "demo-company" })
                .to_string(),
        ))
        .unwrap();

    let response = app().await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_answers_pivot_faq() {
    let response = app()
        .await
        .oneshot(post(
            "/v1/chat",
            json!({
                "text": "チェックインは何時からですか",
                "company_id": "demo-company",
                "session_id": "s-1"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert!(parsed["answer"].as_str().unwrap().contains("15時"));
    assert_eq!(parsed["response_type"], "faq_enhanced");
    assert_eq!(parsed["detected_language"], "ja");
    assert_eq!(parsed["needs_human_escalation"], false);
    assert_eq!(parsed["session_id"], "s-1");
    assert!(parsed["specialized_links"].is_array());
    assert!(parsed["detection"]["method"].is_string());
}

#[tokio::test]
async fn empty_chat_gets_prompt_without_escalation() {
    let response = app()
        .await
        .oneshot(post(
            "/v1/chat",
            json!({ "text": "   ", "company_id": "demo-company" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["needs_human_escalation"], false);
    assert!(!parsed["answer"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_text_is_rejected() {
    let text = "あ".repeat(2_001);
    let response = app()
        .await
        .oneshot(post(
            "/v1/chat",
            json!({ "text": text, "company_id": "demo-company" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "text_too_long");
}

#[tokio::test]
async fn detect_reports_language_and_method() {
    let response = app()
        .await
        .oneshot(post("/v1/detect", json!({ "text": "체크인은 몇 시부터인가요?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["language"], "ko");
    assert!(parsed["confidence"].as_f64().unwrap() > 0.5);
}

#[tokio::test]
async fn translate_rejects_unknown_target() {
    let response = app()
        .await
        .oneshot(post(
            "/v1/translate",
            json!({ "text": "hello", "target": "fr" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn translate_without_engines_passes_text_through() {
    let response = app()
        .await
        .oneshot(post(
            "/v1/translate",
            json!({ "text": "Where is the onsen?", "target": "ja", "source": "en" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["text"], "Where is the onsen?");
    assert_eq!(parsed["cached"], false);
}

#[tokio::test]
async fn classify_reports_route() {
    let response = app()
        .await
        .oneshot(post(
            "/v1/classify",
            json!({ "text": "観光とランチのおすすめ", "faq_confidence": 0.2 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["route"], "mixed");
    assert_eq!(parsed["tourism"], true);
    assert_eq!(parsed["restaurant"], true);
}

#[tokio::test]
async fn upserted_company_becomes_locatable() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(post(
            "/v1/companies",
            json!({
                "id": "beppu-inn",
                "name": "別府の宿",
                "prefecture": "大分県",
                "city": "別府市"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["located"], true);

    let response = app
        .oneshot(post("/v1/locate", json!({ "company_id": "beppu-inn" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["candidate"]["source"], "company_base");
    assert_eq!(parsed["candidate"]["location"]["city"], "別府市");
}

#[tokio::test]
async fn no_location_signals_gives_no_candidate() {
    let response = app()
        .await
        .oneshot(post("/v1/locate", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json_body(response).await["candidate"].is_null());
}

#[tokio::test]
async fn rate_limit_applies_per_ip() {
    let mut settings = settings();
    settings.rate_limit_max = 2;
    settings.rate_limit_window = Duration::from_secs(60);
    let app = build_app_with(settings).await.expect("app should build");

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post("/v1/detect", json!({ "text": "こんにちは" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(post("/v1/detect", json!({ "text": "こんにちは" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn cache_clear_reports_removed_entries() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(post("/v1/detect", json!({ "text": "안녕하세요, 반갑습니다" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post("/v1/cache/clear", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json_body(response).await["detection"].as_u64().unwrap() >= 1);
}
