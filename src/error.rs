//! Crate-level error type.

use crate::llm::LlmError;
use crate::notifier::NotifyError;

/// Errors raised while assembling or running a relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),

    /// HTTP server setup or serving error.
    #[error("server error: {0}")]
    Server(String),

    /// Provider construction error.
    #[error("provider error: {0}")]
    Provider(#[from] LlmError),

    /// Notifier construction error.
    #[error("notifier error: {0}")]
    Notifier(#[from] NotifyError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, RelayError>;
