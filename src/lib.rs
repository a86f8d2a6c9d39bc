//! chat-relay: streamed chat completions with out-of-band notification.
//!
//! A server endpoint forwards a conversation to a language-model provider
//! and streams the generated text back as plain chunks. Once the provider
//! signals the end of the stream, a notifier is fired on a detached task;
//! whatever it does never affects the client response.
//!
//! # Architecture
//!
//! - **Transport**: wire types shared by server and client ([`transport`])
//! - **Provider**: model backends behind one streaming trait ([`llm`])
//! - **Pipeline**: prime, forward, accumulate, notify ([`pipeline`])
//! - **Notifier**: fire-and-forget delivery of completed exchanges ([`notifier`])
//! - **Server**: axum endpoint over the pipeline ([`server`])
//! - **Client**: transcript plus incremental UTF-8 decoding of the reply
//!   ([`client`], [`transcript`], [`decoder`])

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod llm;
pub mod message;
pub mod notifier;
pub mod pipeline;
pub mod server;
pub mod transcript;
pub mod transport;

pub use client::{ChatClient, ClientError};
pub use config::RelayConfig;
pub use decoder::{DecodeError, StreamDecoder, decode_stream};
pub use error::{RelayError, Result};
pub use message::{Message, MessageId, Role};
pub use notifier::{NotificationEvent, Notifier, NotifyError};
pub use pipeline::{CompletionPipeline, CompletionStream, PipelineError, PipelineSettings};
pub use server::ChatServer;
pub use transcript::Transcript;
pub use transport::{ChatMessage, ChatRequest};
