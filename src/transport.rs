//! Wire contract between the chat client and the completion endpoint.
//!
//! ## Request
//!
//! `POST` with a JSON body:
//!
//! ```text
//! {"messages": [{"role": "user", "content": "Hello"}]}
//! ```
//!
//! ## Response
//!
//! On success, `200 OK` with a `text/plain; charset=utf-8` body carrying the
//! assistant text as it is generated. There is no framing and no sentinel:
//! the end of the body is the only completion signal. A failure after output
//! started aborts the body, so the client sees a transport error instead of
//! a clean end.
//!
//! Failures before any output use a JSON [`ErrorResponse`] body.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// Content type of a successful streamed response.
pub const TEXT_STREAM_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Default path of the chat endpoint.
pub const DEFAULT_CHAT_PATH: &str = "/api/chat";

/// One `{role, content}` pair of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self::new(msg.role, msg.content.clone())
    }
}

/// Request body: the full ordered conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// Build a request from a transcript snapshot, dropping ids.
    pub fn from_transcript(snapshot: &[Message]) -> Self {
        Self {
            messages: snapshot.iter().map(ChatMessage::from).collect(),
        }
    }

    /// Most recent user message, if any.
    pub fn latest_user_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }
}

/// JSON body returned when a request fails before any output was streamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Details inside an [`ErrorResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub message: String,
    /// Error class, e.g. `"provider_error"`, `"timeout"`, `"invalid_request_error"`.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Stable machine-readable code, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: error_type.into(),
                code: None,
            },
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error.code = Some(code.into());
        self
    }
}
