//! Web interface.
//!
//! HTTP API over the orchestrator plus static-file serving for the browser
//! front end. Endpoints mirror the external interfaces: preset catalog,
//! config persistence, script generation, build start, status and log
//! queries, and a server-sent-event log stream with idle heartbeats.

use crate::config::ConfigManager;
use crate::models::BuildConfig;
use crate::orchestrator::{Orchestrator, StartError};
use crate::script::ScriptRenderer;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use camino::Utf8PathBuf;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Shared handler state.
#[derive(Clone)]
struct WebState {
    orchestrator: Arc<Orchestrator>,
    config: Arc<ConfigManager>,
}

/// API error type, rendered as `{"success": false, "error": ...}`.
#[derive(Debug)]
enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (
            status,
            Json(json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Create the router with all API endpoints and static-file serving.
pub fn create_router(
    orchestrator: Arc<Orchestrator>,
    config: Arc<ConfigManager>,
    static_dir: Utf8PathBuf,
) -> Router {
    let state = WebState {
        orchestrator,
        config,
    };

    Router::new()
        .route("/api/presets", get(list_presets))
        .route("/api/preset/{name}", get(get_preset))
        .route("/api/save-config", post(save_config))
        .route("/api/generate-script", post(generate_script))
        .route("/api/start-compilation", post(start_compilation))
        .route("/api/compilation-status", get(compilation_status))
        .route("/api/logs", get(get_logs))
        .route("/api/logs/stream", get(stream_logs))
        .route("/api/logs/clear", post(clear_logs))
        .fallback_service(ServeDir::new(static_dir.as_std_path()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// GET /api/presets
async fn list_presets(State(state): State<WebState>) -> ApiResult<Response> {
    let presets = state
        .config
        .load_presets()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(presets).into_response())
}

/// GET /api/preset/{name}
async fn get_preset(
    State(state): State<WebState>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let presets = state
        .config
        .load_presets()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    match presets.get(&name) {
        Some(preset) => Ok(Json(preset.clone()).into_response()),
        None => Err(ApiError::NotFound(format!("preset {} not found", name))),
    }
}

/// POST /api/save-config
async fn save_config(
    State(state): State<WebState>,
    Json(config): Json<BuildConfig>,
) -> ApiResult<Json<serde_json::Value>> {
    config
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state
        .config
        .save_config(&config)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({ "success": true })))
}

/// POST /api/generate-script
async fn generate_script(
    State(state): State<WebState>,
    Json(config): Json<BuildConfig>,
) -> ApiResult<Json<serde_json::Value>> {
    config
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let renderer = ScriptRenderer::new(state.config.work_dir().join("build"));
    let script = renderer
        .render(&config)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({ "success": true, "script_path": script.path.as_str() })))
}

/// POST /api/start-compilation
///
/// Returns immediately with accept/reject; the build itself runs on the
/// orchestrator's background task.
async fn start_compilation(
    State(state): State<WebState>,
    Json(config): Json<BuildConfig>,
) -> ApiResult<Json<serde_json::Value>> {
    match state.orchestrator.clone().start(config) {
        Ok(()) => Ok(Json(json!({ "success": true }))),
        Err(StartError::AlreadyRunning) => {
            Err(ApiError::Conflict("a build is already running".to_string()))
        }
        Err(e @ StartError::InvalidConfiguration(_)) => Err(ApiError::BadRequest(e.to_string())),
    }
}

/// GET /api/compilation-status
async fn compilation_status(State(state): State<WebState>) -> Json<crate::models::PipelineState> {
    Json(state.orchestrator.status())
}

/// GET /api/logs
async fn get_logs(State(state): State<WebState>) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "logs": state.orchestrator.logs() }))
}

/// POST /api/logs/clear
async fn clear_logs(State(state): State<WebState>) -> Json<serde_json::Value> {
    state.orchestrator.clear_logs();
    Json(json!({ "success": true }))
}

/// GET /api/logs/stream
///
/// Server-sent events: one `connected` event at subscribe time, one event
/// per log entry in production order, and heartbeat events whenever no
/// entry arrives within the keep-alive interval.
async fn stream_logs(
    State(state): State<WebState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.orchestrator.subscribe();

    let connected = tokio_stream::once(Ok::<_, Infallible>(
        Event::default().data(r#"{"type":"connected"}"#),
    ));

    let entries = BroadcastStream::new(receiver)
        // A lagged subscriber skips evicted entries rather than erroring out.
        .filter_map(|result| result.ok())
        .map(|entry| {
            let payload = serde_json::to_string(&entry)
                .unwrap_or_else(|_| r#"{"type":"invalid-entry"}"#.to_string());
            Ok::<_, Infallible>(Event::default().data(payload))
        });

    Sse::new(connected.chain(entries)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(1))
            .event(Event::default().data(r#"{"type":"heartbeat"}"#)),
    )
}

/// Bind and serve the web interface until the process exits.
pub async fn serve(
    orchestrator: Arc<Orchestrator>,
    config: Arc<ConfigManager>,
    static_dir: Utf8PathBuf,
    port: u16,
) -> anyhow::Result<()> {
    let app = create_router(orchestrator, config, static_dir);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", addr, e))?;

    tracing::info!("Web interface listening on http://localhost:{}", port);
    tracing::info!("Config file: build/config.json");
    tracing::info!("Build script: build/build_ffmpeg.sh");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))
}
