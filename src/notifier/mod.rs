//! Out-of-band notification of completed exchanges.
//!
//! The completion pipeline hands a [`NotificationEvent`] to [`dispatch`],
//! which runs the [`Notifier`] on a detached task. Whatever the notifier
//! does (succeed, fail, panic, hang) is logged here and never reaches the
//! HTTP response that produced the event.

pub mod email;
pub mod template;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{Instrument, info, warn};

use crate::message::Message;

/// Who receives notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipient {
    /// Display name used in the notification body.
    pub name: String,
    /// Delivery address.
    pub email: String,
}

impl Default for Recipient {
    fn default() -> Self {
        Self {
            name: "Chat User".to_owned(),
            email: String::new(),
        }
    }
}

/// Snapshot of one completed exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Identifier of the HTTP exchange that produced the event.
    pub exchange_id: String,
    /// The latest user turn of the request.
    pub user_message: Message,
    /// The full generated reply.
    pub assistant_message: Message,
    pub recipient: Recipient,
    pub completed_at: DateTime<Utc>,
}

/// Errors reported by notifiers. Logged, never propagated to chat clients.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The notifier is missing required settings.
    #[error("notifier misconfigured: {0}")]
    Config(String),

    /// The delivery request could not be sent.
    #[error("notification request failed: {0}")]
    Request(String),

    /// The delivery service refused the notification.
    #[error("notification rejected with HTTP {status}: {message}")]
    Rejected {
        /// HTTP status returned by the service.
        status: u16,
        /// Error message from the service.
        message: String,
    },
}

/// Delivers completed exchanges out-of-band.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// Returns a [`NotifyError`] describing why delivery failed.
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Run `notifier` for `event` on a detached task.
///
/// The returned handle may be dropped; the task keeps running. Errors and
/// panics are caught and logged.
pub fn dispatch(notifier: Arc<dyn Notifier>, event: NotificationEvent) -> JoinHandle<()> {
    let span = tracing::info_span!(
        "notify",
        exchange_id = %event.exchange_id,
        notifier = notifier.name(),
    );

    tokio::spawn(
        async move {
            let outcome = AssertUnwindSafe(notifier.notify(&event))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => info!("notification delivered"),
                Ok(Err(e)) => warn!(error = %e, "notification failed"),
                Err(_) => warn!("notifier panicked"),
            }
        }
        .instrument(span),
    )
}

/// Notifier that only writes the exchange to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        info!(
            recipient = %event.recipient.email,
            user_chars = event.user_message.content.chars().count(),
            assistant_chars = event.assistant_message.content.chars().count(),
            preview = %template::truncate_chars(&event.user_message.content, 50),
            "chat exchange completed"
        );
        Ok(())
    }
}
