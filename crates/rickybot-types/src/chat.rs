//! Turn records for Rickybot conversations.
//!
//! A [`ChatBlock`] is one user/assistant exchange. Blocks are created when a
//! message is enqueued and then filled in by the session engine as the agent
//! streams its answer. Once a block is completed or failed it is frozen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{Message, MessageRole, ToolCall};

/// Outcome of a single tool invocation made while answering a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Provider-assigned call id, when the backend supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub tool_name: String,
    /// Arguments as sent to the tool, JSON-encoded.
    pub arguments: String,
    /// Tool output, or a description of why the call failed.
    pub content: String,
    pub is_error: bool,
}

/// One user message and the assistant's response to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBlock {
    /// System prompt in force for this turn (set on the opening turn only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    pub user_message: String,
    /// Grows as content deltas arrive; holds the diagnostic on failure.
    pub assistant_message: String,
    #[serde(default)]
    pub tool_responses: Vec<ToolResponse>,
    pub completed: bool,
    pub failed: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatBlock {
    /// Open a new turn for the given user input.
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            system_message: None,
            user_message: user_message.into(),
            assistant_message: String::new(),
            tool_responses: Vec::new(),
            completed: false,
            failed: false,
            created_at: Utc::now(),
        }
    }

    /// Attach the system prompt to this turn.
    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    /// Whether the turn reached `completed` or `failed`.
    pub fn is_terminal(&self) -> bool {
        self.completed || self.failed
    }

    /// Append a streamed content delta. Returns `false` on a frozen turn.
    pub fn append_assistant(&mut self, delta: &str) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.assistant_message.push_str(delta);
        true
    }

    /// Record a tool outcome. Returns `false` on a frozen turn.
    pub fn push_tool_response(&mut self, response: ToolResponse) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.tool_responses.push(response);
        true
    }

    /// Mark the turn completed, replacing the assistant text with the final
    /// message when one is supplied. Returns `false` on a frozen turn.
    pub fn mark_completed(&mut self, final_message: Option<&str>) -> bool {
        if self.is_terminal() {
            return false;
        }
        if let Some(text) = final_message.filter(|t| !t.is_empty()) {
            self.assistant_message = text.to_string();
        }
        self.completed = true;
        true
    }

    /// Mark the turn failed with a diagnostic. Returns `false` on a frozen turn.
    pub fn mark_failed(&mut self, diagnostic: impl std::fmt::Display) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.assistant_message = format!("Error: {diagnostic}");
        self.failed = true;
        true
    }

    /// Render this turn as backend conversation messages.
    ///
    /// Failed turns contribute nothing. A turn that used tools replays as
    /// `user, assistant(tool calls), tool*, assistant(answer)`, the same
    /// shape the tool loop sends while answering it.
    pub fn to_messages(&self) -> Vec<Message> {
        if self.failed {
            return Vec::new();
        }

        let mut messages = Vec::new();
        if let Some(system) = self.system_message.as_deref().filter(|s| !s.is_empty()) {
            messages.push(Message::system(system));
        }
        if !self.user_message.is_empty() {
            messages.push(Message::user(&self.user_message));
        }
        if !self.tool_responses.is_empty() {
            let calls = self.tool_responses.iter().map(ToolResponse::to_call).collect();
            messages.push(Message::assistant_tool_calls("", calls));
            for response in &self.tool_responses {
                messages.push(Message::tool_result(&response.tool_name, &response.content));
            }
        }
        if !self.assistant_message.is_empty() {
            messages.push(Message::new(MessageRole::Assistant, &self.assistant_message));
        }
        messages
    }
}

impl ToolResponse {
    /// The call that produced this response. Arguments that are not valid
    /// JSON are carried as a string.
    pub fn to_call(&self) -> ToolCall {
        ToolCall {
            id: self.call_id.clone(),
            name: self.tool_name.clone(),
            arguments: serde_json::from_str(&self.arguments)
                .unwrap_or_else(|_| serde_json::Value::String(self.arguments.clone())),
        }
    }
}

/// Change notification emitted by a session engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBlockResponse {
    /// Full snapshot of the turn at the time of the change.
    pub chat_block: ChatBlock,
    /// `true` for the echo sent when the turn is created.
    pub is_new: bool,
}
