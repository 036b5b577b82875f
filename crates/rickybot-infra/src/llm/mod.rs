//! LLM provider implementations.
//!
//! Contains concrete implementations of the [`LlmProvider`] trait defined in
//! `rickybot-core`.
//!
//! [`LlmProvider`]: rickybot_core::llm::provider::LlmProvider

pub mod ollama;
