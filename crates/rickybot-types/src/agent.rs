//! Agent-facing types for Rickybot.
//!
//! An agent turns a conversation snapshot plus a new user message into an
//! ordered stream of [`AgentEvent`]s. The session engine consumes that stream
//! with a single state-update loop.

use serde::{Deserialize, Serialize};

use crate::chat::ToolResponse;
use crate::llm::{LlmError, Message, ToolCall};

/// Input for one agent generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Prior conversation, oldest first. Failed turns are already excluded.
    pub history: Vec<Message>,
    /// The user text this generation answers.
    pub user_message: String,
}

/// Incremental progress reported by an agent while answering one turn.
///
/// Events arrive in the order: `ContentDelta*`, then zero or more
/// `ToolCallRequested`/`ToolExecutionStarted`/`ToolExecutionFinished`
/// groups interleaved with more deltas, then exactly one `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A fragment of assistant text.
    ContentDelta { text: String },

    /// The model asked for a tool call.
    ToolCallRequested { call: ToolCall },

    /// The tool call is being executed.
    ToolExecutionStarted { tool_name: String },

    /// A tool call produced a result (or a failure description).
    ToolExecutionFinished { response: ToolResponse },

    /// Generation finished. `message` is the final assistant text.
    Completed { message: String },
}

/// Errors that abort an agent generation.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("tool loop exceeded {0} steps")]
    MaxStepsExceeded(u32),

    #[error("agent error: {0}")]
    Other(String),
}
