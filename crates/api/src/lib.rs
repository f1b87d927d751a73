mod rate_limit;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Json, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use serde::{Deserialize, Serialize};
use tabi_agents::{build_pipeline, CacheReport, Capabilities, PipelineSettings, ResponseOrchestrator};
use tabi_core::{
    ChatInput, Degradation, DetectionResult, GeoPoint, IntentClassification, LangCode,
    LocationCandidate, ResponseEnvelope, TurnContext,
};
use tabi_observability::{AppMetrics, MetricsSnapshot};
use tabi_storage::{Company, CompanyDirectory, CompanyRepository, Store};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use crate::rate_limit::IpRateLimiter;

const MAX_TEXT_CHARS: usize = 2_000;
const MAX_COMPANY_ID_LEN: usize = 128;
const DEFAULT_API_KEY: &str = "dev-tabi-key";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub database_url: Option<String>,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub body_limit_bytes: usize,
    pub allowed_origins: Vec<String>,
    pub pipeline: PipelineSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
            database_url: None,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 120,
            body_limit_bytes: 64 * 1024,
            allowed_origins: default_origins(),
            pipeline: PipelineSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env::var("TABI_API_KEY").unwrap_or(defaults.api_key),
            database_url: env::var("TABI_DATABASE_URL")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            rate_limit_window: Duration::from_secs(
                env::var("TABI_RATE_LIMIT_WINDOW_SECONDS")
                    .ok()
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(defaults.rate_limit_window.as_secs()),
            ),
            rate_limit_max: env::var("TABI_RATE_LIMIT_MAX")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(defaults.rate_limit_max),
            body_limit_bytes: env::var("TABI_BODY_LIMIT_BYTES")
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(defaults.body_limit_bytes),
            allowed_origins: env::var("TABI_ALLOWED_ORIGINS")
                .ok()
                .map(|value| {
                    value
                        .split(',')
                        .map(|origin| origin.trim().trim_end_matches('/').to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.allowed_origins),
            pipeline: PipelineSettings::from_env(),
        }
    }
}

fn default_origins() -> Vec<String> {
    ["http://localhost:8501", "http://127.0.0.1:8501", "http://localhost:3000"]
        .iter()
        .map(|origin| origin.to_string())
        .collect()
}

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<ResponseOrchestrator>,
    pub capabilities: Arc<Capabilities>,
    pub metrics: Arc<AppMetrics>,
    pub store: Arc<Store>,
    pub directory: CompanyDirectory,
    pub api_key: String,
    pub limiter: IpRateLimiter,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: MetricsSnapshot,
    caches: CacheReport,
    capabilities: Capabilities,
    companies: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
    #[serde(default)]
    pub company_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub session_previous_language: Option<String>,
    #[serde(default)]
    pub manual_location: Option<String>,
    #[serde(default)]
    pub gps_coords: Option<GeoPoint>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    #[serde(flatten)]
    envelope: ResponseEnvelope,
    session_id: Option<String>,
    detection: DetectionView,
    degradations: Vec<Degradation>,
}

#[derive(Debug, Serialize)]
struct DetectionView {
    language: LangCode,
    confidence: f32,
    method: String,
}

impl From<&DetectionResult> for DetectionView {
    fn from(result: &DetectionResult) -> Self {
        Self {
            language: result.language,
            confidence: result.confidence,
            method: result.method_label(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetectRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
struct TranslateRequest {
    text: String,
    target: String,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    text: String,
    #[serde(default)]
    faq_confidence: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ClassifyResponse {
    #[serde(flatten)]
    classification: IntentClassification,
    route: &'static str,
}

#[derive(Debug, Deserialize)]
struct LocateRequest {
    #[serde(default)]
    company_id: String,
    #[serde(default)]
    manual_location: Option<String>,
    #[serde(default)]
    gps_coords: Option<GeoPoint>,
}

#[derive(Debug, Serialize)]
struct LocateResponse {
    candidate: Option<LocationCandidate>,
}

#[derive(Debug, Deserialize)]
struct CompanyUpsertRequest {
    id: String,
    name: String,
    #[serde(default)]
    prefecture: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
}

#[derive(Debug, Serialize)]
struct CacheClearResponse {
    detection: usize,
    translation: usize,
}

pub async fn build_app() -> Result<Router> {
    build_app_with(Settings::from_env()).await
}

pub async fn build_app_with(settings: Settings) -> Result<Router> {
    let metrics = AppMetrics::shared();

    let store = match settings.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };
    let directory = CompanyDirectory::new();
    directory
        .hydrate(&store)
        .await
        .context("failed to hydrate company directory")?;

    // blocking HTTP clients must be created and dropped off the runtime
    let pipeline_settings = settings.pipeline.clone();
    let companies = Arc::new(directory.clone());
    let pipeline_metrics = metrics.clone();
    let pipeline = tokio::task::spawn_blocking(move || {
        build_pipeline(&pipeline_settings, companies, pipeline_metrics)
    })
    .await
    .context("pipeline builder panicked")??;

    let limiter = IpRateLimiter::new(settings.rate_limit_window, settings.rate_limit_max);
    spawn_limiter_pruning(limiter.clone(), settings.rate_limit_window);

    let state = ApiState {
        orchestrator: pipeline.orchestrator,
        capabilities: Arc::new(pipeline.capabilities),
        metrics,
        store: Arc::new(store),
        directory,
        api_key: settings.api_key.clone(),
        limiter,
    };

    Ok(build_router(state, &settings))
}

fn spawn_limiter_pruning(limiter: IpRateLimiter, window: Duration) {
    let period = window.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.prune();
            if removed > 0 {
                tracing::debug!(removed, "pruned idle rate limit keys");
            }
        }
    });
}

pub fn build_router(state: ApiState, settings: &Settings) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/chat", post(chat))
        .route("/v1/detect", post(detect))
        .route("/v1/translate", post(translate))
        .route("/v1/classify", post(classify))
        .route("/v1/locate", post(locate))
        .route("/v1/companies", post(company_upsert))
        .route("/v1/cache/clear", post(cache_clear))
        .layer(build_cors_layer(&settings.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(settings.body_limit_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        caches: state.orchestrator.cache_report(),
        capabilities: state.capabilities.as_ref().clone(),
        companies: state.directory.len(),
    };
    (StatusCode::OK, Json(payload))
}

async fn chat(State(state): State<ApiState>, Json(request): Json<ChatRequest>) -> Response {
    if let Err(response) = validate_text(&request.text) {
        return response;
    }
    if request.company_id.len() > MAX_COMPANY_ID_LEN {
        return bad_request("invalid_company_id", "company_id is too long");
    }

    let session_id = request.session_id.clone();
    let input = ChatInput {
        text: request.text,
        company_id: request.company_id,
        session_id: request.session_id,
        session_previous_language: LangCode::from_optional_str(
            request.session_previous_language.as_deref(),
        ),
        manual_location: request.manual_location,
        gps_coords: request.gps_coords,
    };

    // dropping this future (client gone) cancels the turn between collaborator calls
    let context = TurnContext::new();
    let guard = context.cancel_on_drop();
    let orchestrator = state.orchestrator.clone();
    let turn_context = context.clone();
    let joined =
        tokio::task::spawn_blocking(move || orchestrator.handle_with(&turn_context, input)).await;
    guard.disarm();

    match joined {
        Ok(outcome) => {
            let response = ChatResponse {
                detection: DetectionView::from(&outcome.detection),
                envelope: outcome.envelope,
                session_id,
                degradations: outcome.degradations,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(error) => {
            warn!(error = %error, "chat worker failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "chat_failed",
                    "message": "申し訳ございません。しばらくしてから再度お試しください。"
                })),
            )
                .into_response()
        }
    }
}

async fn detect(State(state): State<ApiState>, Json(request): Json<DetectRequest>) -> Response {
    if let Err(response) = validate_text(&request.text) {
        return response;
    }
    let orchestrator = state.orchestrator.clone();
    let joined =
        tokio::task::spawn_blocking(move || orchestrator.detector().detect(&request.text)).await;

    match joined {
        Ok(result) => (StatusCode::OK, Json(DetectionView::from(&result))).into_response(),
        Err(error) => {
            warn!(error = %error, "detect worker failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "detect_failed" })),
            )
                .into_response()
        }
    }
}

async fn translate(
    State(state): State<ApiState>,
    Json(request): Json<TranslateRequest>,
) -> Response {
    if let Err(response) = validate_text(&request.text) {
        return response;
    }
    let Some(target) = LangCode::parse(&request.target) else {
        return bad_request("invalid_language", "target must be one of ja, en, ko, zh, zh-tw");
    };
    let source = match request.source.as_deref() {
        Some(raw) => match LangCode::parse(raw) {
            Some(source) => Some(source),
            None => {
                return bad_request(
                    "invalid_language",
                    "source must be one of ja, en, ko, zh, zh-tw",
                )
            }
        },
        None => None,
    };

    let context = TurnContext::new();
    let guard = context.cancel_on_drop();
    let orchestrator = state.orchestrator.clone();
    let turn_context = context.clone();
    let joined = tokio::task::spawn_blocking(move || {
        orchestrator
            .translator()
            .translate_with(&turn_context, &request.text, target, source)
    })
    .await;
    guard.disarm();

    match joined {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => {
            warn!(error = %error, "translate worker failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "translate_failed" })),
            )
                .into_response()
        }
    }
}

async fn classify(State(state): State<ApiState>, Json(request): Json<ClassifyRequest>) -> Response {
    if let Err(response) = validate_text(&request.text) {
        return response;
    }
    let classification = state.orchestrator.classifier().classify(&request.text);
    let route = classification
        .route(request.faq_confidence.unwrap_or(0.0))
        .as_str();
    (
        StatusCode::OK,
        Json(ClassifyResponse {
            classification,
            route,
        }),
    )
        .into_response()
}

async fn locate(State(state): State<ApiState>, Json(request): Json<LocateRequest>) -> Response {
    let orchestrator = state.orchestrator.clone();
    let joined = tokio::task::spawn_blocking(move || {
        orchestrator.resolver().resolve(
            request.manual_location.as_deref(),
            request.gps_coords,
            &request.company_id,
        )
    })
    .await;

    match joined {
        Ok(candidate) => (StatusCode::OK, Json(LocateResponse { candidate })).into_response(),
        Err(error) => {
            warn!(error = %error, "locate worker failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "locate_failed" })),
            )
                .into_response()
        }
    }
}

async fn company_upsert(
    State(state): State<ApiState>,
    Json(request): Json<CompanyUpsertRequest>,
) -> Response {
    let id = request.id.trim().to_string();
    if id.is_empty() || id.len() > MAX_COMPANY_ID_LEN {
        return bad_request("invalid_company_id", "id must be 1-128 bytes");
    }

    let mut company = Company::new(id.clone(), request.name.trim());
    company.prefecture = request.prefecture;
    company.city = request.city;
    company.address = request.address;
    company.postal_code = request.postal_code;

    let result: Result<bool> = async {
        state.store.upsert_company(&company).await?;
        state.directory.refresh(state.store.as_ref(), &id).await
    }
    .await;

    match result {
        Ok(located) => {
            info!(company_id = %id, located, "company upserted");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "id": id, "located": located })),
            )
                .into_response()
        }
        Err(error) => {
            warn!(company_id = %id, error = %error, "company upsert failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "company_upsert_failed",
                    "message": error.to_string()
                })),
            )
                .into_response()
        }
    }
}

async fn cache_clear(State(state): State<ApiState>) -> impl IntoResponse {
    let cleared = CacheClearResponse {
        detection: state.orchestrator.detector().clear_cache(),
        translation: state.orchestrator.translator().clear_cache(),
    };
    info!(
        detection = cleared.detection,
        translation = cleared.translation,
        "caches cleared"
    );
    (StatusCode::OK, Json(cleared))
}

fn validate_text(text: &str) -> Result<(), Response> {
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(bad_request(
            "text_too_long",
            "text must be at most 2000 characters",
        ));
    }
    Ok(())
}

fn bad_request(error: &'static str, message: &'static str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": error,
            "message": message
        })),
    )
        .into_response()
}

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/health")
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if header_key == state.api_key {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": "missing or invalid x-api-key"
        })),
    )
        .into_response()
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "rate limit exceeded for this IP"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}
