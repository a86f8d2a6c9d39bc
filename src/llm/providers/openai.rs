//! OpenAI-compatible Chat Completions adapter.
//!
//! Calls `POST {base_url}/v1/chat/completions` with `stream: true` and
//! normalizes the `data: {...}` SSE chunks to [`LlmEvent`]s. Any server that
//! speaks the same dialect (OpenAI, Ollama, vLLM, llama.cpp) works by
//! overriding the base URL.
//!
//! # Examples
//!
//! ```rust,no_run
//! use chat_relay::llm::provider::ProviderAdapter;
//! use chat_relay::llm::providers::openai::{OpenAiAdapter, OpenAiConfig};
//! use chat_relay::llm::types::{ModelRef, RequestOptions};
//! use chat_relay::transport::ChatMessage;
//!
//! # async fn example() -> Result<(), chat_relay::llm::error::LlmError> {
//! let adapter = OpenAiAdapter::new(OpenAiConfig::new("sk-..."));
//! let messages = vec![ChatMessage::user("Hello")];
//! let stream = adapter
//!     .stream(&ModelRef::new("gpt-4o"), &messages, &RequestOptions::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::llm::error::LlmError;
use crate::llm::events::{FinishReason, LlmEvent};
use crate::llm::provider::{LlmEventStream, ProviderAdapter};
use crate::llm::providers::sse::{SseEvent, SseLineParser};
use crate::llm::types::{ModelRef, RequestOptions};
use crate::transport::ChatMessage;

/// Default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

// ── Configuration ─────────────────────────────────────────────

/// Configuration for the OpenAI adapter.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Base URL (defaults to `https://api.openai.com`).
    pub base_url: String,
    /// Optional organization ID.
    pub org_id: Option<String>,
    /// Instructions prepended as a `system` message on every call.
    pub system_prompt: Option<String>,
    /// Time allowed until response headers arrive. The body stream itself
    /// is not bounded here.
    pub response_timeout: Option<Duration>,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("org_id", &self.org_id)
            .field("system_prompt", &self.system_prompt.is_some())
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            org_id: None,
            system_prompt: None,
            response_timeout: None,
        }
    }

    /// Set a custom base URL. A trailing slash is ignored.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }
}

// ── Request Builder ───────────────────────────────────────────

/// Build the JSON request body for the Chat Completions API.
pub fn build_completions_request(
    model: &ModelRef,
    system_prompt: Option<&str>,
    messages: &[ChatMessage],
    options: &RequestOptions,
) -> serde_json::Value {
    let mut wire_messages = Vec::with_capacity(messages.len() + 1);
    if let Some(prompt) = system_prompt {
        wire_messages.push(serde_json::json!({"role": "system", "content": prompt}));
    }
    wire_messages.extend(messages.iter().map(|m| {
        serde_json::json!({
            "role": m.role.as_str(),
            "content": m.content,
        })
    }));

    let mut body = serde_json::json!({
        "model": model.model_id,
        "messages": wire_messages,
        "stream": true,
    });

    if let Some(obj) = body.as_object_mut() {
        if let Some(max_tokens) = options.max_tokens {
            obj.insert("max_tokens".into(), serde_json::json!(max_tokens));
        }
        if let Some(temp) = options.temperature {
            obj.insert("temperature".into(), serde_json::json!(temp));
        }
    }

    body
}

// ── Response Parsing ──────────────────────────────────────────

/// Parse a single SSE data payload from the Chat Completions API.
///
/// Unparseable payloads yield no events. An `{"error": ...}` payload, which
/// some compatible servers send mid-stream, becomes a [`LlmEvent::StreamError`].
pub fn parse_completions_chunk(data: &str) -> Vec<LlmEvent> {
    let parsed: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    if let Some(error) = parsed.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| error.to_string());
        return vec![LlmEvent::StreamError { error: message }];
    }

    let mut events = Vec::new();

    if let Some(choices) = parsed.get("choices").and_then(|c| c.as_array()) {
        for choice in choices {
            if let Some(content) = choice
                .get("delta")
                .and_then(|d| d.get("content"))
                .and_then(|c| c.as_str())
                && !content.is_empty()
            {
                events.push(LlmEvent::TextDelta {
                    text: content.to_string(),
                });
            }

            if let Some(reason) = choice.get("finish_reason").and_then(|f| f.as_str()) {
                events.push(LlmEvent::StreamEnd {
                    finish_reason: FinishReason::from_openai(reason),
                });
            }
        }
    }

    events
}

/// Extract an error message from an OpenAI error response body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

// ── Adapter Implementation ────────────────────────────────────

/// OpenAI-compatible provider adapter.
pub struct OpenAiAdapter {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl OpenAiAdapter {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url)
    }

    /// Map an HTTP error status to the appropriate [`LlmError`].
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        let message = extract_error_message(body);
        match status.as_u16() {
            401 | 403 => LlmError::AuthError(format!("OpenAI authentication failed: {message}")),
            429 => LlmError::RequestError(format!("OpenAI rate limited: {message}")),
            code => LlmError::ProviderError(format!("OpenAI HTTP {code}: {message}")),
        }
    }

    /// Map a failure to send the request or receive its headers.
    fn map_send_error(err: &reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::TimeoutError(format!("OpenAI request timed out: {err}"))
        } else if err.is_builder() {
            LlmError::ConfigError(format!("invalid OpenAI request: {err}"))
        } else {
            LlmError::RequestError(format!("OpenAI request failed: {err}"))
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream(
        &self,
        model: &ModelRef,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<LlmEventStream, LlmError> {
        if self.config.api_key.trim().is_empty() {
            return Err(LlmError::ConfigError("OpenAI API key is empty".into()));
        }

        let body = build_completions_request(
            model,
            self.config.system_prompt.as_deref(),
            messages,
            options,
        );

        let mut request = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .header("Accept", "text/event-stream");

        if let Some(org_id) = &self.config.org_id {
            request = request.header("OpenAI-Organization", org_id);
        }

        let send = request.json(&body).send();
        let sent = match self.config.response_timeout {
            Some(limit) => tokio::time::timeout(limit, send).await.map_err(|_| {
                LlmError::TimeoutError(format!(
                    "OpenAI did not respond within {}ms",
                    limit.as_millis()
                ))
            })?,
            None => send.await,
        };
        let response = sent.map_err(|e| Self::map_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("openai-req")
            .to_string();

        tracing::debug!(%request_id, model = %model, "openai stream opened");

        Ok(Box::pin(create_event_stream(
            response.bytes_stream(),
            request_id,
            model.clone(),
        )))
    }
}

/// Internal state for the event stream.
struct StreamState {
    byte_stream: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    sse_parser: SseLineParser,
    request_id: String,
    model: ModelRef,
    started: bool,
    body_done: bool,
    finished: bool,
    pending: VecDeque<LlmEvent>,
}

impl StreamState {
    /// Queue the events of one SSE message. `[DONE]` counts as an end
    /// signal for servers that never send a `finish_reason`.
    fn enqueue_sse_event(&mut self, event: &SseEvent) {
        if event.is_done() {
            self.pending.push_back(LlmEvent::StreamEnd {
                finish_reason: FinishReason::Stop,
            });
        } else {
            self.pending.extend(parse_completions_chunk(&event.data));
        }
    }
}

/// Turn the HTTP body into an [`LlmEvent`] stream.
///
/// Ends after the first `StreamEnd` or `StreamError`; a body that closes
/// without either (or a `[DONE]` sentinel) simply ends the stream, which
/// callers treat as incomplete.
fn create_event_stream(
    byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    request_id: String,
    model: ModelRef,
) -> impl Stream<Item = LlmEvent> + Send {
    futures_util::stream::unfold(
        StreamState {
            byte_stream: Box::pin(byte_stream),
            sse_parser: SseLineParser::new(),
            request_id,
            model,
            started: false,
            body_done: false,
            finished: false,
            pending: VecDeque::new(),
        },
        |mut state| async move {
            if !state.started {
                state.started = true;
                let start = LlmEvent::StreamStart {
                    request_id: state.request_id.clone(),
                    model: state.model.clone(),
                };
                return Some((start, state));
            }

            loop {
                if state.finished {
                    return None;
                }

                if let Some(event) = state.pending.pop_front() {
                    if matches!(
                        event,
                        LlmEvent::StreamEnd { .. } | LlmEvent::StreamError { .. }
                    ) {
                        state.finished = true;
                    }
                    return Some((event, state));
                }

                if state.body_done {
                    return None;
                }

                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => {
                        for sse_event in state.sse_parser.push(&chunk) {
                            state.enqueue_sse_event(&sse_event);
                        }
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        let err = LlmEvent::StreamError {
                            error: format!("stream read error: {e}"),
                        };
                        return Some((err, state));
                    }
                    None => {
                        state.body_done = true;
                        if let Some(sse_event) = state.sse_parser.flush() {
                            state.enqueue_sse_event(&sse_event);
                        }
                    }
                }
            }
        },
    )
}
