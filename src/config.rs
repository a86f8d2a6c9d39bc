//! Configuration for the relay server and its collaborators.
//!
//! Loaded from TOML. Every section is optional and falls back to defaults.
//! Secrets are never stored in the file: the config names environment
//! variables that hold them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::llm::providers::openai::{self, OpenAiAdapter, OpenAiConfig};
use crate::llm::providers::scripted::ScriptedProvider;
use crate::llm::{ModelRef, ProviderAdapter, RequestOptions};
use crate::notifier::email::{self, ResendConfig, ResendNotifier};
use crate::notifier::template::TemplateSettings;
use crate::notifier::{LogNotifier, Notifier, Recipient};
use crate::pipeline::{CompletionPipeline, PipelineSettings};
use crate::transport::DEFAULT_CHAT_PATH;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Conversation model provider settings.
    pub provider: ProviderConfig,
    /// Completion pipeline settings.
    pub pipeline: PipelineConfig,
    /// Completion notification settings.
    pub notifier: NotifierConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Port to bind (0 = any free port).
    pub port: u16,
    /// Path of the chat endpoint.
    pub chat_path: String,
    /// Maximum request body size in bytes (None = unlimited).
    pub max_body_bytes: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3000,
            chat_path: DEFAULT_CHAT_PATH.to_owned(),
            max_body_bytes: None,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which provider backend to use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible Chat Completions API.
    #[default]
    OpenAi,
    /// Fixed replay, no network.
    Scripted,
}

/// Conversation model provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// API base URL. Point at Ollama, vLLM or similar to run locally.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Optional `OpenAI-Organization` header value.
    pub organization: Option<String>,
    /// Instructions sent ahead of the conversation.
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<usize>,
    /// Seconds to wait for the provider to start responding.
    pub response_timeout_secs: Option<u64>,
    /// Chunks replayed by the scripted provider.
    pub scripted_chunks: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            base_url: openai::DEFAULT_BASE_URL.to_owned(),
            model: "gpt-4o".to_owned(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
            organization: None,
            system_prompt: None,
            temperature: None,
            max_tokens: None,
            response_timeout_secs: None,
            scripted_chunks: vec![
                "Hello".to_owned(),
                " from".to_owned(),
                " chat-relay".to_owned(),
                "!".to_owned(),
            ],
        }
    }
}

impl ProviderConfig {
    /// Construct the configured provider.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the API key variable is unset.
    pub fn build(&self) -> Result<Arc<dyn ProviderAdapter>> {
        match self.kind {
            ProviderKind::Scripted => Ok(Arc::new(ScriptedProvider::new(
                self.scripted_chunks.iter().cloned(),
            ))),
            ProviderKind::OpenAi => {
                let api_key = read_secret(&self.api_key_env)?;
                let mut config = OpenAiConfig::new(api_key).with_base_url(&self.base_url);
                if let Some(org) = &self.organization {
                    config = config.with_org_id(org);
                }
                if let Some(prompt) = &self.system_prompt {
                    config = config.with_system_prompt(prompt);
                }
                if let Some(secs) = self.response_timeout_secs {
                    config = config.with_response_timeout(Duration::from_secs(secs));
                }
                Ok(Arc::new(OpenAiAdapter::new(config)))
            }
        }
    }

    /// Sampling options sent with every request.
    pub fn request_options(&self) -> RequestOptions {
        let mut options = RequestOptions::new();
        if let Some(max_tokens) = self.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            options = options.with_temperature(temperature);
        }
        options
    }
}

/// Completion pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Deadline for one provider call, first byte to end signal.
    pub provider_timeout_secs: u64,
    /// Send a notification even when the model returned no text.
    pub notify_on_empty_response: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: 120,
            notify_on_empty_response: false,
        }
    }
}

/// Which notifier backend to use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Write completed exchanges to the log only.
    #[default]
    Log,
    /// Send an email through Resend.
    Resend,
}

/// Notification configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    /// Environment variable holding the Resend API key.
    pub api_key_env: String,
    pub base_url: String,
    /// Sender address.
    pub from: String,
    pub recipient: Recipient,
    /// Link placed in the notification body.
    pub chat_url: String,
    /// Upper bound on one delivery attempt.
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            api_key_env: "RESEND_API_KEY".to_owned(),
            base_url: email::DEFAULT_BASE_URL.to_owned(),
            from: "Chat Relay <chat@resend.dev>".to_owned(),
            recipient: Recipient::default(),
            chat_url: TemplateSettings::default().chat_url,
            timeout_secs: email::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl NotifierConfig {
    /// Construct the configured notifier.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the Resend key or recipient is
    /// missing, or the timeout is zero.
    pub fn build(&self) -> Result<Arc<dyn Notifier>> {
        if self.timeout_secs == 0 {
            return Err(RelayError::Config(
                "notifier.timeout_secs must be greater than zero".into(),
            ));
        }
        match self.kind {
            NotifierKind::Log => Ok(Arc::new(LogNotifier)),
            NotifierKind::Resend => {
                if self.recipient.email.trim().is_empty() {
                    return Err(RelayError::Config(
                        "notifier.recipient.email is required for the resend notifier".into(),
                    ));
                }
                let api_key = read_secret(&self.api_key_env)?;
                let config = ResendConfig::new(api_key, &self.from)
                    .with_base_url(&self.base_url)
                    .with_template(TemplateSettings {
                        chat_url: self.chat_url.clone(),
                    })
                    .with_timeout(Duration::from_secs(self.timeout_secs));
                Ok(Arc::new(ResendNotifier::new(config)))
            }
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RelayError::Config(e.to_string()))
    }

    /// Load `path` if given, else the default path if it exists, else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Self::default_config_path();
                if default.is_file() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RelayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `$XDG_CONFIG_HOME/chat-relay/config.toml`, falling back to the
    /// platform config directory.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("chat-relay").join("config.toml")
        } else if let Some(dir) = dirs::config_dir() {
            dir.join("chat-relay").join("config.toml")
        } else {
            std::env::temp_dir().join("chat-relay").join("config.toml")
        }
    }

    /// Settings for [`CompletionPipeline`] derived from this config.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings::new(ModelRef::new(&self.provider.model))
            .with_options(self.provider.request_options())
            .with_provider_timeout(Duration::from_secs(self.pipeline.provider_timeout_secs))
            .with_notify_on_empty_response(self.pipeline.notify_on_empty_response)
            .with_recipient(self.notifier.recipient.clone())
    }

    /// Build the provider, notifier and pipeline described by this config.
    ///
    /// # Errors
    ///
    /// Returns an error if a collaborator cannot be constructed.
    pub fn build_pipeline(&self) -> Result<CompletionPipeline> {
        if self.pipeline.provider_timeout_secs == 0 {
            return Err(RelayError::Config(
                "pipeline.provider_timeout_secs must be greater than zero".into(),
            ));
        }
        let provider = self.provider.build()?;
        let notifier = self.notifier.build()?;
        Ok(CompletionPipeline::new(
            provider,
            notifier,
            self.pipeline_settings(),
        ))
    }
}

fn read_secret(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(RelayError::Config(format!(
            "environment variable {var} is not set"
        ))),
    }
}
