use crate::middleware::{cors_middleware, CorsConfig};
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, StatusCode},
    middleware as axum_mw,
    response::{IntoResponse, Response},
    routing::{on, MethodFilter},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use relay_backends::{FailoverOrchestrator, SessionEvent};
use relay_core::validate_chat_request;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// Body of the 500 response for payloads that are not JSON.
pub const PROCESSING_ERROR: &str = "Error processing request";

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<FailoverOrchestrator>,
}

/// The HTTP gateway.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway with a wildcard CORS policy.
    pub fn build(orchestrator: Arc<FailoverOrchestrator>) -> Router {
        Self::build_with_cors(orchestrator, CorsConfig::permissive())
    }

    /// Build the gateway with the given CORS policy.
    pub fn build_with_cors(orchestrator: Arc<FailoverOrchestrator>, cors: CorsConfig) -> Router {
        let state = Arc::new(AppState { orchestrator });

        Router::new()
            .route(
                "/health",
                on(MethodFilter::GET, health_handler).fallback(not_found_handler),
            )
            .route(
                "/chat",
                on(MethodFilter::POST, chat_handler)
                    .layer(DefaultBodyLimit::disable())
                    .fallback(not_found_handler),
            )
            .fallback(not_found_handler)
            .with_state(state)
            .layer(axum_mw::from_fn_with_state(Arc::new(cors), cors_middleware))
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "stats": state.orchestrator.stats().snapshot(),
    }))
}

async fn chat_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "Failed to read request body");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_ERROR);
        }
    };
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "Request processing error");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_ERROR);
        }
    };

    let messages = match validate_chat_request(&payload) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "Rejected chat request");
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    let request_id = Uuid::new_v4();
    let span = info_span!("chat", %request_id);
    span.in_scope(|| info!(messages = messages.len(), "Processing chat request"));

    // The session task inherits `span`, so every attempt log carries the request id.
    let events = span.in_scope(|| state.orchestrator.spawn(messages));
    let stream = ReceiverStream::new(events).map(|event| Ok::<_, Infallible>(render_event(event)));

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

/// Render a session event as raw body text.
///
/// Fragments are written unframed; a terminal failure becomes a trailing
/// `\n\nError: ...` line.
pub fn render_event(event: SessionEvent) -> String {
    match event {
        SessionEvent::Fragment(text) => text,
        SessionEvent::Failed(message) => format!("\n\nError: {message}"),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
