//! Conversation model provider layer.
//!
//! Providers normalize their native streaming formats to [`events::LlmEvent`]
//! behind the [`provider::ProviderAdapter`] trait, so the completion pipeline
//! never sees provider-specific wire details.

pub mod error;
pub mod events;
pub mod provider;
pub mod providers;
pub mod types;

pub use error::LlmError;
pub use events::{FinishReason, LlmEvent};
pub use provider::{LlmEventStream, ProviderAdapter};
pub use types::{ModelRef, RequestOptions};
