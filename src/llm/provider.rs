//! Provider adapter trait for model backends.
//!
//! A provider turns an ordered conversation into a lazy, finite,
//! non-restartable stream of [`LlmEvent`]s. Calls are stateless: the full
//! history is passed every time and nothing is remembered between calls.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use super::error::LlmError;
use super::events::LlmEvent;
use super::types::{ModelRef, RequestOptions};
use crate::transport::ChatMessage;

/// A boxed stream of normalized provider events.
pub type LlmEventStream = Pin<Box<dyn Stream<Item = LlmEvent> + Send>>;

/// Trait for conversation model providers.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Returns the provider name (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Open a generation stream for `messages`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be started (connection,
    /// authentication, HTTP status). Failures after the stream is returned
    /// arrive as [`LlmEvent::StreamError`].
    async fn stream(
        &self,
        model: &ModelRef,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<LlmEventStream, LlmError>;
}
