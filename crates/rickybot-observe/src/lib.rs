//! Observability setup for Rickybot.

pub mod tracing_setup;
