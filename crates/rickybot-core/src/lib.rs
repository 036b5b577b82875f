//! Business logic and port traits for Rickybot.
//!
//! This crate owns the per-conversation session engine, the session registry,
//! the tag-filtered notification broker, and the agent/provider/tool traits
//! that the infrastructure layer implements. It depends only on
//! `rickybot-types` -- never on `rickybot-infra` or any HTTP crate.

pub mod agent;
pub mod llm;
pub mod notify;
pub mod session;
pub mod tool;
