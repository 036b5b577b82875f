//! HTTP request handlers.

pub mod chat;
pub mod tool;
pub mod ws;
