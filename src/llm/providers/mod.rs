//! Provider implementations.
//!
//! - [`openai`]: OpenAI-compatible Chat Completions over SSE
//! - [`scripted`]: deterministic replay provider for tests and offline runs
//! - [`sse`]: incremental Server-Sent Events parser

pub mod openai;
pub mod scripted;
pub mod sse;
