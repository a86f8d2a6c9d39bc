//! Deterministic provider that replays a fixed script.
//!
//! Used by the test suite and by `chat-relay serve --provider scripted` to run
//! the whole pipeline offline. Every call replays the same chunks, so it is
//! stateless like a real provider. It records the conversation it received
//! so tests can assert what a real provider would have been sent.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::error::LlmError;
use crate::llm::events::{FinishReason, LlmEvent};
use crate::llm::provider::{LlmEventStream, ProviderAdapter};
use crate::llm::types::{ModelRef, RequestOptions};
use crate::transport::ChatMessage;

/// How a scripted stream ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEnding {
    /// Emit `StreamEnd { Stop }` after the chunks.
    Finish,
    /// Emit `StreamError` after the chunks.
    Fail(String),
    /// Stop emitting without any end signal.
    Truncate,
    /// Never end; the stream stays pending after the chunks.
    Hang,
}

/// A provider that replays `chunks` and then the configured ending.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    chunks: Vec<String>,
    ending: ScriptEnding,
    chunk_delay: Duration,
    open_delay: Duration,
    open_error: Option<LlmError>,
    calls: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedProvider {
    /// A provider that emits `chunks` then finishes normally.
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ending: ScriptEnding::Finish,
            chunk_delay: Duration::ZERO,
            open_delay: Duration::ZERO,
            open_error: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider whose `stream` call itself fails.
    pub fn failing(error: LlmError) -> Self {
        let mut provider = Self::new(Vec::<String>::new());
        provider.open_error = Some(error);
        provider
    }

    pub fn with_ending(mut self, ending: ScriptEnding) -> Self {
        self.ending = ending;
        self
    }

    /// Sleep before each chunk and before the ending.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Sleep before the stream is returned.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Conversations received so far, one entry per call.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        model: &ModelRef,
        messages: &[ChatMessage],
        _options: &RequestOptions,
    ) -> Result<LlmEventStream, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }

        let chunks = self.chunks.clone();
        let ending = self.ending.clone();
        let delay = self.chunk_delay;
        let model = model.clone();

        let stream = async_stream::stream! {
            yield LlmEvent::StreamStart {
                request_id: format!("scripted-{}", uuid::Uuid::new_v4()),
                model,
            };
            for text in chunks {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield LlmEvent::TextDelta { text };
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match ending {
                ScriptEnding::Finish => {
                    yield LlmEvent::StreamEnd { finish_reason: FinishReason::Stop };
                }
                ScriptEnding::Fail(error) => {
                    yield LlmEvent::StreamError { error };
                }
                ScriptEnding::Truncate => {}
                ScriptEnding::Hang => {
                    futures_util::future::pending::<()>().await;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
