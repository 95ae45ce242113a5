//! HTTP API gateway for Toolloop.
//!
//! Exposes the agent loop over HTTP:
//! - `POST /api/chat` with `{message, history}` answers `{response: {messages}}`
//! - `GET /health` reports whether the chat backend is reachable
//!
//! Built on Axum. Each chat request runs on its own task, tied to the
//! request by a cancellation token: when the client goes away or the
//! request times out, the run is abandoned at its next suspension point.

use axum::extract::DefaultBodyLimit;
use axum::extract::rejection::JsonRejection;
use axum::{
    Router,
    extract::State,
    http::{Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use toolloop_agent::AgentLoop;
use toolloop_core::error::Error;
use toolloop_core::message::{Message, Transcript};
use toolloop_core::provider::Health;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agent: Arc<AgentLoop>,

    /// Upper bound on one chat request, tool rounds included
    pub request_timeout: Duration,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
///
/// Builds the backend, tool registry and agent once and shares them across
/// requests. Runs until Ctrl-C.
pub async fn start(config: toolloop_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let backend = toolloop_providers::build_from_config(&config.backend)?;
    let notes = toolloop_tools::NoteStore::new();
    let tools = Arc::new(toolloop_tools::default_registry(
        &config.tools.disabled,
        &notes,
    )?);
    let agent = Arc::new(AgentLoop::from_config(backend, tools, &config));

    let state = Arc::new(GatewayState {
        agent,
        request_timeout: Duration::from_secs(config.gateway.request_timeout_secs),
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

// --- Handlers ---

#[derive(Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    history: Vec<Message>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: Transcript,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected chat request body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    if body.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Message is required");
    }

    info!(
        message_len = body.message.len(),
        history = body.history.len(),
        "Chat request received"
    );

    // Dropping the guard (client disconnect drops this future) cancels the run.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let agent = state.agent.clone();
    let token = cancel.clone();
    let run = tokio::spawn(async move {
        agent
            .run_with_cancel(&body.message, &body.history, &token)
            .await
    });

    match tokio::time::timeout(state.request_timeout, run).await {
        Ok(Ok(Ok(transcript))) => Json(ChatResponse {
            response: transcript,
        })
        .into_response(),
        Ok(Ok(Err(Error::Cancelled))) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Request was cancelled")
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "Agent run failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Ok(Err(join_error)) => {
            error!(error = %join_error, "Agent task aborted");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate response",
            )
        }
        Err(_) => {
            cancel.cancel();
            warn!(timeout_secs = state.request_timeout.as_secs(), "Chat request timed out");
            error_response(StatusCode::GATEWAY_TIMEOUT, "Request timed out")
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    backend: BackendStatus,
}

#[derive(Serialize)]
struct BackendStatus {
    name: String,
    endpoint: String,
    model: String,
    reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

async fn health_handler(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let backend = state.agent.backend();
    let health = backend.health_check().await;

    let (status, code, reason) = match health {
        Health::Healthy => ("ok", StatusCode::OK, None),
        Health::Unreachable { reason } => ("degraded", StatusCode::SERVICE_UNAVAILABLE, Some(reason)),
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            backend: BackendStatus {
                name: backend.name().to_string(),
                endpoint: backend.endpoint().to_string(),
                model: state.agent.model().to_string(),
                reachable: reason.is_none(),
                reason,
            },
        }),
    )
}
