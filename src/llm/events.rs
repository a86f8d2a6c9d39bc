//! Normalized streaming event model for model providers.
//!
//! Every provider normalizes its output to [`LlmEvent`]. A stream flows:
//!
//! ```text
//! StreamStart → TextDelta* → StreamEnd
//! ```
//!
//! or terminates early with `StreamError`. Only `StreamEnd` counts as a
//! completed generation; a stream that simply stops without it is incomplete.

use super::types::ModelRef;

/// A normalized streaming event from any provider.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmEvent {
    /// Stream has started. First event in every stream.
    StreamStart {
        /// Provider-assigned request identifier.
        request_id: String,
        /// The model being used.
        model: ModelRef,
    },

    /// A chunk of generated text.
    TextDelta {
        /// The text fragment.
        text: String,
    },

    /// Stream has ended normally.
    StreamEnd {
        /// Why the model stopped generating.
        finish_reason: FinishReason,
    },

    /// Stream encountered an error.
    StreamError {
        /// Description of what went wrong.
        error: String,
    },
}

/// The reason the model stopped generating output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop (end of response).
    Stop,
    /// Hit the max token limit.
    Length,
    /// Content was filtered by safety systems.
    ContentFilter,
    /// Provider-specific or unknown reason.
    Other,
}

impl FinishReason {
    /// Map an OpenAI-style `finish_reason` string.
    pub fn from_openai(reason: &str) -> Self {
        match reason {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "content_filter" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::ContentFilter => write!(f, "content_filter"),
            Self::Other => write!(f, "other"),
        }
    }
}
