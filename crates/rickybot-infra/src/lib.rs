//! Infrastructure implementations for Rickybot.
//!
//! Concrete adapters for the ports defined in `rickybot-core`: the Ollama
//! streaming chat provider, the HTTP tool executor, signed session cookies,
//! and the TOML configuration loader.

pub mod config;
pub mod cookie;
pub mod llm;
pub mod tool;
