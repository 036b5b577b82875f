//! HTTP layer for Rickybot.
//!
//! Axum router with the chat endpoints under `/api/`, the live notification
//! WebSocket, the built-in calculator tool endpoint, and a health check.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
