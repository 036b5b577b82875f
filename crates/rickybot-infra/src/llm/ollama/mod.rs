//! Ollama chat provider implementation.
//!
//! This module provides the [`OllamaProvider`] which implements the
//! [`LlmProvider`](rickybot_core::llm::provider::LlmProvider) trait for the
//! Ollama `/api/chat` endpoint, including NDJSON streaming and tool calls.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::OllamaProvider;
