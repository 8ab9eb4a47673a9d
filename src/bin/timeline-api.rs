//! Timeline API - HTTP front end for the extraction engine
//!
//! Stateless JSON endpoints over the engine operations, plus an active rule
//! set that `/extract` falls back to when a request carries no rules.

use axum::{
    extract::{rejection::StringRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use jsontimeline::rules::{default_rules, RuleSet};
use jsontimeline::{
    auto_detect, extract_from_document, list_available_paths, merge_entity_groups, resolve_path,
    suggest_rules, transform, validate_rule, ExtractionReport, ExtractionRule, FilterState,
    RuleValidation, Settings, TimelineEntity, VisualizationData,
};

struct AppState {
    settings: Settings,
    rules: RwLock<RuleSet>,
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = match std::env::var("JSONTIMELINE_CONFIG") {
        Ok(path) => Settings::load_from_file(path)?,
        Err(_) => Settings::default(),
    }
    .with_env_overrides()?;

    let rules = settings.load_rules()?;
    tracing::info!("Active rule set: {} rules", rules.len());

    let state = Arc::new(AppState {
        settings,
        rules: RwLock::new(rules),
    });

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .map_err(|e| format!("Invalid PORT: {}", e))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Timeline API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    // Bodies over the cap are cut off by the extractor and reported by `read_body`.
    let body_limit = usize::try_from(state.settings.max_file_size).unwrap_or(usize::MAX);

    Router::new()
        .route("/extract", post(extract))
        .route("/auto-detect", post(auto_detect_entities))
        .route("/resolve", post(resolve))
        .route("/paths", post(paths))
        .route("/suggest", post(suggest))
        .route("/transform", post(transform_entities))
        .route("/merge", post(merge))
        .route("/rules", get(active_rules))
        .route("/rules/validate", post(validate))
        .route("/rules/import", post(import_rules))
        .route("/rules/defaults", get(defaults))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Unwrap an extracted body, enforcing the configured size cap.
fn read_body(state: &AppState, body: Result<String, StringRejection>) -> Result<String, AppError> {
    let limit = state.settings.max_file_size;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(format!("Request is larger than the {} byte limit", limit))
        } else {
            AppError::ValidationError(rejection.body_text())
        }
    })?;

    let size = body.len() as u64;
    if size > limit {
        return Err(AppError::PayloadTooLarge(format!(
            "Request is {} bytes, larger than the {} byte limit",
            size, limit
        )));
    }
    Ok(body)
}

/// Parse a request body as JSON.
fn parse_body<T: DeserializeOwned>(state: &AppState, body: Result<String, StringRejection>) -> Result<T, AppError> {
    let body = read_body(state, body)?;
    serde_json::from_str(&body).map_err(|e| AppError::ValidationError(format!("Invalid JSON: {}", e)))
}

// Request types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRequest {
    document_id: String,
    document: Value,
    /// Falls back to the active rule set when absent.
    rules: Option<Vec<ExtractionRule>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutoDetectRequest {
    document_id: String,
    document: Value,
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    document: Value,
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathsRequest {
    document: Value,
    max_depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SuggestRequest {
    document: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformRequest {
    entities: Vec<TimelineEntity>,
    #[serde(default)]
    rules: Vec<ExtractionRule>,
    #[serde(default)]
    selected_files: Vec<String>,
    #[serde(default)]
    filter_state: FilterState,
}

#[derive(Debug, Deserialize)]
struct MergeRequest {
    groups: Vec<Vec<TimelineEntity>>,
}

// Handlers

/// Extract entities from one document
async fn extract(
    State(state): State<Arc<AppState>>,
    body: Result<String, StringRejection>,
) -> Result<Json<ExtractionReport>, AppError> {
    let request: ExtractRequest = parse_body(&state, body)?;

    let report = match &request.rules {
        Some(rules) => extract_from_document(&request.document_id, &request.document, rules),
        None => {
            let active = state.rules.read().await;
            extract_from_document(&request.document_id, &request.document, active.iter())
        }
    };

    Ok(Json(report))
}

async fn auto_detect_entities(
    State(state): State<Arc<AppState>>,
    body: Result<String, StringRejection>,
) -> Result<Json<Vec<TimelineEntity>>, AppError> {
    let request: AutoDetectRequest = parse_body(&state, body)?;
    Ok(Json(auto_detect(&request.document, &request.document_id)))
}

/// Resolve a path; a missing path is reported, not an error
async fn resolve(
    State(state): State<Arc<AppState>>,
    body: Result<String, StringRejection>,
) -> Result<Json<ResolveResponse>, AppError> {
    let request: ResolveRequest = parse_body(&state, body)?;
    let value = resolve_path(&request.document, &request.path).cloned();

    Ok(Json(ResolveResponse {
        found: value.is_some(),
        value,
    }))
}

async fn paths(
    State(state): State<Arc<AppState>>,
    body: Result<String, StringRejection>,
) -> Result<Json<PathsResponse>, AppError> {
    let request: PathsRequest = parse_body(&state, body)?;
    let depth = request.max_depth.unwrap_or(state.settings.available_paths_depth);

    Ok(Json(PathsResponse {
        paths: list_available_paths(&request.document, depth),
    }))
}

async fn suggest(
    State(state): State<Arc<AppState>>,
    body: Result<String, StringRejection>,
) -> Result<Json<Vec<ExtractionRule>>, AppError> {
    let request: SuggestRequest = parse_body(&state, body)?;
    Ok(Json(suggest_rules(&request.document, &state.settings.color_palette)))
}

async fn transform_entities(
    State(state): State<Arc<AppState>>,
    body: Result<String, StringRejection>,
) -> Result<Json<VisualizationData>, AppError> {
    let request: TransformRequest = parse_body(&state, body)?;

    Ok(Json(transform(
        &request.entities,
        &request.rules,
        &request.selected_files,
        &request.filter_state,
    )))
}

async fn merge(
    State(state): State<Arc<AppState>>,
    body: Result<String, StringRejection>,
) -> Result<Json<Vec<TimelineEntity>>, AppError> {
    let request: MergeRequest = parse_body(&state, body)?;
    Ok(Json(merge_entity_groups(request.groups)))
}

/// Structural validation of one raw rule
async fn validate(
    State(state): State<Arc<AppState>>,
    body: Result<String, StringRejection>,
) -> Result<Json<RuleValidation>, AppError> {
    let raw: Value = parse_body(&state, body)?;
    Ok(Json(validate_rule(&raw)))
}

/// Replace the active rule set; the old set is kept on failure
async fn import_rules(
    State(state): State<Arc<AppState>>,
    body: Result<String, StringRejection>,
) -> Result<Json<Vec<ExtractionRule>>, AppError> {
    let body = read_body(&state, body)?;
    let imported = RuleSet::parse_json(&body).map_err(|e| AppError::ValidationError(e.to_string()))?;

    let mut active = state.rules.write().await;
    *active = imported;
    tracing::info!("Imported {} rules", active.len());

    Ok(Json(active.to_vec()))
}

async fn active_rules(State(state): State<Arc<AppState>>) -> Json<Vec<ExtractionRule>> {
    Json(state.rules.read().await.to_vec())
}

async fn defaults() -> Json<Vec<ExtractionRule>> {
    Json(default_rules())
}

/// Health check endpoint (liveness)
async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "timeline-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// Error handling

#[derive(Debug)]
enum AppError {
    ValidationError(String),
    PayloadTooLarge(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
        };

        (status, Json(serde_json::json!({
            "error": message
        }))).into_response()
    }
}

// Response types

#[derive(Debug, Serialize)]
struct ResolveResponse {
    found: bool,
    value: Option<Value>,
}

#[derive(Debug, Serialize)]
struct PathsResponse {
    paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn state_with_limit(max_file_size: u64) -> Arc<AppState> {
        Arc::new(AppState {
            settings: Settings {
                max_file_size,
                ..Settings::default()
            },
            rules: RwLock::new(RuleSet::with_defaults()),
        })
    }

    async fn serve(state: Arc<AppState>) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(state)).await.unwrap();
        });
        addr
    }

    async fn post(addr: SocketAddr, path: &str, body: &[u8]) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let head = format!(
            "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            path,
            body.len()
        );
        stream.write_all(head.as_bytes()).await.unwrap();
        stream.write_all(body).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[test]
    fn test_read_body_enforces_cap() {
        let state = state_with_limit(16);

        assert_eq!(read_body(&state, Ok("[]".to_string())).unwrap(), "[]");
        assert!(matches!(
            read_body(&state, Ok("x".repeat(17))),
            Err(AppError::PayloadTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_bodies_above_two_megabytes_reach_handlers() {
        let addr = serve(state_with_limit(3 * 1024 * 1024)).await;

        // Not JSON, so a handler that runs answers 400 rather than 413.
        let body = vec![b'x'; 2_500_000];
        let response = post(addr, "/extract", &body).await;
        assert!(response.starts_with("HTTP/1.1 400"), "{}", response);
        assert!(response.contains("Invalid JSON"));
    }

    #[tokio::test]
    async fn test_extract_uses_active_rules() {
        let addr = serve(state_with_limit(1024 * 1024)).await;

        let body = serde_json::json!({
            "documentId": "plan.json",
            "document": {"events": [{"id": "E1", "startDate": "2024-01-01"}]}
        })
        .to_string();
        let response = post(addr, "/extract", body.as_bytes()).await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.contains("\"E1\""));
    }

    #[tokio::test]
    async fn test_rule_import_goes_through_size_check() {
        let state = state_with_limit(64);
        let addr = serve(state.clone()).await;

        let rules = serde_json::json!([{
            "name": "far-too-long-for-the-limit",
            "arrayPath": "items",
            "startDatePath": "start",
            "endDatePath": "end",
            "color": "#123456",
            "enabled": true
        }])
        .to_string();
        assert!(rules.len() > 64);

        let response = post(addr, "/rules/import", rules.as_bytes()).await;
        assert!(response.starts_with("HTTP/1.1 413"), "{}", response);
        assert_eq!(state.rules.read().await.len(), RuleSet::with_defaults().len());
    }
}
