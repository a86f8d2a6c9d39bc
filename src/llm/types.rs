//! Core request types for the provider layer.
//!
//! - [`ModelRef`] names the model a provider should use
//! - [`RequestOptions`] configures generation parameters

use serde::{Deserialize, Serialize};
use std::fmt;

/// A reference to a specific model.
///
/// # Examples
///
/// ```
/// use chat_relay::llm::types::ModelRef;
///
/// let model = ModelRef::new("gpt-4o");
/// assert_eq!(model.to_string(), "gpt-4o");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelRef {
    /// Provider-specific model ID (e.g. `"gpt-4o"`).
    pub model_id: String,
}

impl ModelRef {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.model_id)
    }
}

/// Options controlling generation.
///
/// # Examples
///
/// ```
/// use chat_relay::llm::types::RequestOptions;
///
/// let opts = RequestOptions::new().with_max_tokens(512).with_temperature(0.2);
/// assert_eq!(opts.max_tokens, Some(512));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Maximum tokens to generate. `None` means use provider default.
    pub max_tokens: Option<usize>,
    /// Sampling temperature. `None` means use provider default.
    pub temperature: Option<f64>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}
