//! Completion pipeline: one chat request in, a stream of text chunks out.
//!
//! [`CompletionPipeline::start`] opens the provider stream and waits for the
//! first output before returning, so failures that happen before anything
//! was generated surface as an `Err` (and an HTTP error status). After that
//! every text delta is forwarded as soon as it arrives, while a copy is kept
//! for the notification sent when the provider signals the end of the
//! stream.
//!
//! Dropping the returned [`CompletionStream`] drops the provider stream with
//! it. Nothing is notified for an exchange that did not finish.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::llm::{FinishReason, LlmError, LlmEvent, LlmEventStream, ModelRef, ProviderAdapter, RequestOptions};
use crate::message::Message;
use crate::notifier::{self, NotificationEvent, Notifier, Recipient};
use crate::transport::ChatRequest;

/// Default bound on a whole provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: ModelRef,
    pub options: RequestOptions,
    /// Deadline for the provider call, from the request until the end signal.
    pub provider_timeout: Duration,
    /// Notify even when the model produced no text.
    pub notify_on_empty_response: bool,
    pub recipient: Recipient,
}

impl PipelineSettings {
    pub fn new(model: ModelRef) -> Self {
        Self {
            model,
            options: RequestOptions::default(),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            notify_on_empty_response: false,
            recipient: Recipient::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_notify_on_empty_response(mut self, notify: bool) -> Self {
        self.notify_on_empty_response = notify;
        self
    }

    pub fn with_recipient(mut self, recipient: Recipient) -> Self {
        self.recipient = recipient;
        self
    }
}

/// Why an exchange failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// The request cannot be sent to a provider.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider rejected the call or reported an error mid-stream.
    #[error("provider failed: {0}")]
    Provider(#[from] LlmError),

    /// The provider call exceeded its deadline.
    #[error("provider did not finish within {0:?}")]
    Timeout(Duration),

    /// The provider stream closed without an end signal.
    #[error("provider stream ended without completing")]
    Incomplete,
}

impl PipelineError {
    /// Error class used in JSON error bodies.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Timeout(_) | Self::Provider(LlmError::TimeoutError(_)) => "timeout",
            Self::Provider(_) | Self::Incomplete => "provider_error",
        }
    }

    /// Stable code, reusing the provider error codes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Provider(e) => e.code(),
            Self::Timeout(_) => crate::llm::error::error_codes::TIMEOUT_ERROR,
            Self::Incomplete => crate::llm::error::error_codes::STREAM_FAILED,
        }
    }
}

/// Orchestrates provider, streaming and notification for chat requests.
///
/// Cheap to clone; the server shares one across all requests.
#[derive(Clone)]
pub struct CompletionPipeline {
    provider: Arc<dyn ProviderAdapter>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<PipelineSettings>,
}

impl std::fmt::Debug for CompletionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionPipeline")
            .field("provider", &self.provider.name())
            .field("notifier", &self.notifier.name())
            .field("settings", &self.settings)
            .finish()
    }
}

enum Step {
    Text(String),
    End(FinishReason),
}

impl CompletionPipeline {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        notifier: Arc<dyn Notifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            provider,
            notifier,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Start an exchange.
    ///
    /// Resolves once the provider produced its first text or finished
    /// without any.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] for an empty conversation, or when the
    /// provider fails, times out, or closes before producing output.
    pub async fn start(&self, request: ChatRequest) -> Result<CompletionStream, PipelineError> {
        if request.messages.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "conversation has no messages".into(),
            ));
        }

        let exchange_id = uuid::Uuid::new_v4().to_string();
        let timeout = self.settings.provider_timeout;
        let deadline = Instant::now() + timeout;
        let latest_user = request.latest_user_message().map(|m| m.content.clone());

        info!(
            exchange_id = %exchange_id,
            provider = self.provider.name(),
            model = %self.settings.model,
            messages = request.messages.len(),
            "starting completion"
        );

        let opened = timeout_at(
            deadline,
            self.provider
                .stream(&self.settings.model, &request.messages, &self.settings.options),
        )
        .await;
        let mut events = match opened {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                warn!(exchange_id = %exchange_id, error = %e, "provider rejected request");
                return Err(e.into());
            }
            Err(_) => {
                warn!(exchange_id = %exchange_id, ?timeout, "provider timed out before responding");
                return Err(PipelineError::Timeout(timeout));
            }
        };

        let first = match next_step(&mut events, deadline, timeout).await {
            Ok(step) => step,
            Err(e) => {
                warn!(exchange_id = %exchange_id, error = %e, "provider failed before any output");
                return Err(e);
            }
        };

        let exchange = Exchange {
            exchange_id: exchange_id.clone(),
            latest_user,
            notifier: Arc::clone(&self.notifier),
            settings: Arc::clone(&self.settings),
        };

        let inner = async_stream::stream! {
            let mut reply = String::new();
            let mut chunks = 0usize;
            let mut pending = Some(first);

            loop {
                let step = match pending.take() {
                    Some(step) => step,
                    None => match next_step(&mut events, deadline, timeout).await {
                        Ok(step) => step,
                        Err(e) => {
                            warn!(
                                exchange_id = %exchange.exchange_id,
                                error = %e,
                                chunks,
                                "completion failed mid-stream"
                            );
                            yield Err(e);
                            break;
                        }
                    },
                };

                match step {
                    Step::Text(text) => {
                        chunks += 1;
                        reply.push_str(&text);
                        yield Ok(Bytes::from(text));
                    }
                    Step::End(finish_reason) => {
                        info!(
                            exchange_id = %exchange.exchange_id,
                            chunks,
                            chars = reply.chars().count(),
                            %finish_reason,
                            "completion finished"
                        );
                        exchange.finish(std::mem::take(&mut reply));
                        break;
                    }
                }
            }
        };

        Ok(CompletionStream {
            exchange_id,
            inner: Box::pin(inner),
        })
    }
}

/// Pull the next meaningful step from the provider, skipping start markers
/// and empty deltas.
async fn next_step(
    events: &mut LlmEventStream,
    deadline: Instant,
    timeout: Duration,
) -> Result<Step, PipelineError> {
    loop {
        match timeout_at(deadline, events.next()).await {
            Err(_) => return Err(PipelineError::Timeout(timeout)),
            Ok(None) => return Err(PipelineError::Incomplete),
            Ok(Some(LlmEvent::StreamStart { request_id, .. })) => {
                debug!(%request_id, "provider stream opened");
            }
            Ok(Some(LlmEvent::TextDelta { text })) => {
                if !text.is_empty() {
                    return Ok(Step::Text(text));
                }
            }
            Ok(Some(LlmEvent::StreamEnd { finish_reason })) => {
                return Ok(Step::End(finish_reason));
            }
            Ok(Some(LlmEvent::StreamError { error })) => {
                return Err(LlmError::StreamError(error).into());
            }
        }
    }
}

/// What the stream needs to notify once the provider finishes.
struct Exchange {
    exchange_id: String,
    latest_user: Option<String>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<PipelineSettings>,
}

impl Exchange {
    fn finish(&self, reply: String) {
        let Some(user_text) = &self.latest_user else {
            debug!(exchange_id = %self.exchange_id, "no user message in request, not notifying");
            return;
        };
        if reply.is_empty() && !self.settings.notify_on_empty_response {
            debug!(exchange_id = %self.exchange_id, "empty reply, not notifying");
            return;
        }

        let event = NotificationEvent {
            exchange_id: self.exchange_id.clone(),
            user_message: Message::user(user_text.clone()),
            assistant_message: Message::assistant(reply),
            recipient: self.settings.recipient.clone(),
            completed_at: Utc::now(),
        };
        notifier::dispatch(Arc::clone(&self.notifier), event);
    }
}

/// Body of a started exchange: text chunks in generation order.
///
/// Ends cleanly only after the provider's end signal. A failure after
/// output started is yielded as a final `Err` item.
pub struct CompletionStream {
    exchange_id: String,
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, PipelineError>> + Send>>,
}

impl CompletionStream {
    pub fn exchange_id(&self) -> &str {
        &self.exchange_id
    }

    /// Drain the stream into a single string.
    ///
    /// # Errors
    ///
    /// Returns the first error yielded by the stream.
    pub async fn collect_text(mut self) -> Result<String, PipelineError> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            let chunk = chunk?;
            text.push_str(&String::from_utf8_lossy(&chunk));
        }
        Ok(text)
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream")
            .field("exchange_id", &self.exchange_id)
            .finish_non_exhaustive()
    }
}

impl Stream for CompletionStream {
    type Item = Result<Bytes, PipelineError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
