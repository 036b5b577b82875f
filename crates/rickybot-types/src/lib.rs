//! Shared domain types for Rickybot.
//!
//! This crate contains the data shapes exchanged between the session engine,
//! the agent backend, the notification layer and the HTTP surface: session
//! identities, turn records, LLM messages, agent events, configuration, and
//! their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod agent;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod session;
