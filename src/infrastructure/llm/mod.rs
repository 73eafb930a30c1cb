//! OpenAI-compatible chat-completions adapter for the chat-model port.
//!
//! The LLM backend is typically a LiteLLM proxy fronting whatever model the
//! operator selected; any endpoint speaking the chat-completions dialect
//! with tool calls works.

pub mod client;
pub mod retry;
pub mod types;

pub use client::{ChatCompletionsClient, ChatCompletionsConfig};
