use std::time::Duration;

use thiserror::Error;

use crate::session::SessionId;

/// Errors returned by a session engine to its callers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("message queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("session has been shut down")]
    ShutDown,
}

/// Errors related to the session registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session '{0}' already exists")]
    AlreadyExists(SessionId),
}

/// Errors raised while invoking a tool.
///
/// These never abort a generation: the tool loop turns them into an
/// error-flagged tool response that is fed back to the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: '{0}'")]
    UnknownTool(String),

    #[error("failed to encode arguments: {0}")]
    Arguments(String),

    #[error("tool request failed: {0}")]
    Network(String),

    #[error("tool returned status {status}")]
    Status { status: u16 },

    #[error("malformed tool response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Execution(String),
}

/// Errors from signing or verifying the session cookie.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CookieError {
    #[error("empty key")]
    EmptyKey,

    #[error("empty value")]
    EmptyValue,

    #[error("empty signed value")]
    EmptySignedValue,

    #[error("invalid base64 encoding")]
    InvalidEncoding,

    #[error("signed value is too short")]
    TooShort,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid signing secret")]
    InvalidSecret,
}

/// Errors that end one subscriber's delivery loop.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}
