//! Email notifier backed by the Resend HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::template::{ChatNotification, TemplateSettings};
use super::{NotificationEvent, Notifier, NotifyError};

/// Default Resend API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.resend.com";

/// Upper bound on one send, connection included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection and sender settings for [`ResendNotifier`].
#[derive(Clone)]
pub struct ResendConfig {
    pub api_key: String,
    pub base_url: String,
    /// Sender, e.g. `Chat Relay <chat@example.com>`.
    pub from: String,
    pub template: TemplateSettings,
    /// Total time allowed for one API call.
    pub timeout: Duration,
}

impl std::fmt::Debug for ResendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("from", &self.from)
            .field("template", &self.template)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ResendConfig {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            from: from.into(),
            template: TemplateSettings::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_template(mut self, template: TemplateSettings) -> Self {
        self.template = template;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

/// Sends one email per completed exchange.
///
/// Every call is bounded by [`ResendConfig::timeout`], so a dispatched
/// notification task always ends even when the service stops answering.
pub struct ResendNotifier {
    config: ResendConfig,
    client: reqwest::Client,
}

impl ResendNotifier {
    pub fn new(config: ResendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    pub fn config(&self) -> &ResendConfig {
        &self.config
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    fn name(&self) -> &str {
        "resend"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        if event.recipient.email.trim().is_empty() {
            return Err(NotifyError::Config("recipient email is not set".into()));
        }

        let rendered = ChatNotification::render(event, &self.config.template);
        let body = SendEmailRequest {
            from: &self.config.from,
            to: [event.recipient.email.as_str()],
            subject: &rendered.subject,
            html: &rendered.html,
            text: &rendered.text,
        };

        let url = format!("{}/emails", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        debug!(status = status.as_u16(), "resend accepted notification");
        Ok(())
    }
}

/// Pull `message` out of a Resend error body, falling back to the raw text.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_owned())
}
