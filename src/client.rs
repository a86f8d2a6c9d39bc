//! Chat client session.
//!
//! A [`ChatClient`] owns one [`Transcript`] and talks to a chat relay
//! endpoint. Each send posts the whole transcript, decodes the streamed
//! reply and appends exactly one assistant message when the body ends
//! cleanly. A failed exchange leaves the user message in place so it can be
//! retried.

use tracing::{debug, warn};

use crate::decoder::{DecodeError, decode_stream_with};
use crate::message::Message;
use crate::transcript::{Transcript, TranscriptError};
use crate::transport::{ChatRequest, ErrorResponse};

/// Errors from a client exchange.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Empty or whitespace-only input.
    #[error("message is empty")]
    EmptyInput,

    /// `retry` was called with no unanswered user message.
    #[error("no unanswered message to retry")]
    NothingToRetry,

    /// Another exchange holds the transcript.
    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    /// The request could not be sent.
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status before streaming.
    #[error("server returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message from the server's JSON error body.
        message: String,
    },

    /// The response body failed or was malformed.
    #[error("response stream failed: {0}")]
    Decode(#[from] DecodeError),
}

/// A chat session against one relay endpoint.
#[derive(Debug)]
pub struct ChatClient {
    endpoint: String,
    http: reqwest::Client,
    transcript: Transcript,
}

impl ChatClient {
    /// Client for the chat endpoint at `endpoint`, e.g.
    /// `http://127.0.0.1:3000/api/chat`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_http_client(endpoint, reqwest::Client::new())
    }

    pub fn with_http_client(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
            transcript: Transcript::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Send `text` and wait for the complete reply.
    ///
    /// # Errors
    ///
    /// See [`ClientError`]. On any error after the user message was
    /// appended, no assistant message is added.
    pub async fn send(&mut self, text: &str) -> Result<&Message, ClientError> {
        self.send_streaming(text, |_| {}).await
    }

    /// Like [`send`](Self::send), calling `on_chunk` with reply text as it
    /// arrives.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_streaming<F>(&mut self, text: &str, on_chunk: F) -> Result<&Message, ClientError>
    where
        F: FnMut(&str),
    {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyInput);
        }
        if self.transcript.is_in_flight() {
            return Err(TranscriptError::SendInFlight.into());
        }
        self.transcript.append(Message::user(text));
        self.exchange(on_chunk).await
    }

    /// Re-post the transcript when its last entry is an unanswered user
    /// message, typically after a failed send.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NothingToRetry`] if the last entry already
    /// has an answer, otherwise the same errors as [`send`](Self::send).
    pub async fn retry(&mut self) -> Result<&Message, ClientError> {
        self.retry_streaming(|_| {}).await
    }

    /// Like [`retry`](Self::retry), calling `on_chunk` with reply text as
    /// it arrives.
    ///
    /// # Errors
    ///
    /// Same as [`retry`](Self::retry).
    pub async fn retry_streaming<F>(&mut self, on_chunk: F) -> Result<&Message, ClientError>
    where
        F: FnMut(&str),
    {
        if !self.transcript.awaiting_reply() {
            return Err(ClientError::NothingToRetry);
        }
        self.exchange(on_chunk).await
    }

    async fn exchange<F>(&mut self, on_chunk: F) -> Result<&Message, ClientError>
    where
        F: FnMut(&str),
    {
        let guard = self.transcript.begin_exchange()?;
        let request = ChatRequest::from_transcript(self.transcript.snapshot());

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClientError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = server_error_message(&body);
            warn!(status = status.as_u16(), %message, "chat request rejected");
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let reply = match decode_stream_with(response.bytes_stream(), on_chunk).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "reply stream failed");
                return Err(e.into());
            }
        };
        drop(guard);

        debug!(chars = reply.chars().count(), "reply complete");
        Ok(self.transcript.append(Message::assistant(reply)))
    }
}

fn server_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_owned(),
    }
}
