//! HTTP endpoint for streamed chat completions.
//!
//! ## Endpoints
//!
//! - `POST /api/chat` (path configurable): body is a [`ChatRequest`], the
//!   response streams plain text
//! - `GET /health`: liveness probe

use std::net::SocketAddr;

use axum::Router;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{RelayError, Result};
use crate::llm::LlmError;
use crate::pipeline::{CompletionPipeline, PipelineError};
use crate::transport::{ChatRequest, ErrorResponse, TEXT_STREAM_CONTENT_TYPE};

/// Header carrying the exchange id of a streamed response.
pub const EXCHANGE_ID_HEADER: &str = "x-exchange-id";

#[derive(Clone)]
struct AppState {
    pipeline: CompletionPipeline,
}

/// Build the router without binding it.
pub fn router(pipeline: CompletionPipeline, config: &ServerConfig) -> Router {
    let limit = match config.max_body_bytes {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route(&config.chat_path, post(handle_chat))
        .route("/health", get(handle_health))
        .layer(limit)
        .with_state(AppState { pipeline })
}

/// Chat relay HTTP server running on a background task.
pub struct ChatServer {
    addr: SocketAddr,
    chat_path: String,
    handle: JoinHandle<()>,
}

impl ChatServer {
    /// Bind `{config.host}:{config.port}` (port `0` picks a free port) and
    /// start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn start(pipeline: CompletionPipeline, config: &ServerConfig) -> Result<Self> {
        if !config.chat_path.starts_with('/') {
            return Err(RelayError::Config(format!(
                "server.chat_path must start with '/': {}",
                config.chat_path
            )));
        }

        let app = router(pipeline, config);
        let listener = TcpListener::bind(config.bind_addr())
            .await
            .map_err(|e| RelayError::Server(format!("bind {} failed: {e}", config.bind_addr())))?;
        let addr = listener
            .local_addr()
            .map_err(|e| RelayError::Server(format!("failed to get local addr: {e}")))?;

        info!("chat relay listening on http://{addr}{}", config.chat_path);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("chat relay server error: {e}");
            }
        });

        Ok(Self {
            addr,
            chat_path: config.chat_path.clone(),
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Full URL of the chat endpoint.
    pub fn chat_url(&self) -> String {
        format!("http://{}{}", self.addr, self.chat_path)
    }

    /// Stop serving. In-flight responses are cut off.
    pub fn shutdown(&self) {
        self.handle.abort();
    }

    /// Wait until the server task exits.
    pub async fn wait(&mut self) {
        let _ = (&mut self.handle).await;
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_chat(
    State(state): State<AppState>,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("chat_request", %request_id);

    async move {
        let request = match body {
            Ok(Json(request)) => request,
            Err(rejection) => {
                warn!(status = rejection.status().as_u16(), error = %rejection, "chat request rejected");
                return rejection_response(&rejection);
            }
        };
        info!(messages = request.messages.len(), "chat request received");
        match state.pipeline.start(request).await {
            Ok(stream) => {
                let exchange_id = HeaderValue::from_str(stream.exchange_id()).ok();
                let mut response = (
                    [
                        (CONTENT_TYPE, TEXT_STREAM_CONTENT_TYPE),
                        (CACHE_CONTROL, "no-cache"),
                    ],
                    Body::from_stream(stream),
                )
                    .into_response();
                if let Some(id) = exchange_id {
                    response.headers_mut().insert(EXCHANGE_ID_HEADER, id);
                }
                response
            }
            Err(e) => {
                warn!(error = %e, "chat request failed before streaming");
                error_response(&e)
            }
        }
    }
    .instrument(span)
    .await
}

/// HTTP status for a failure that happened before any output.
pub fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        PipelineError::Timeout(_) | PipelineError::Provider(LlmError::TimeoutError(_)) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        PipelineError::Provider(_) | PipelineError::Incomplete => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: &PipelineError) -> Response {
    let body = ErrorResponse::new(err.error_type(), err.to_string()).with_code(err.code());
    (status_for(err), Json(body)).into_response()
}

/// Body that could not be read or parsed, in the same envelope as
/// pipeline errors. The status is the one axum chose (400, 413, 415, 422).
fn rejection_response(rejection: &JsonRejection) -> Response {
    let status = rejection.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "PAYLOAD_TOO_LARGE"
    } else {
        "INVALID_REQUEST"
    };
    let body = ErrorResponse::new("invalid_request_error", rejection.body_text()).with_code(code);
    (status, Json(body)).into_response()
}
