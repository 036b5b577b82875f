//! Configuration types for Rickybot.
//!
//! `RickybotConfig` represents the `rickybot.toml` file that controls the
//! listen address, the agent backend, tool dispatch, and queue/buffer sizes.
//! Every field has a default so an empty or partial file is valid.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level configuration for the Rickybot server.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RickybotConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub agent: AgentSettings,

    #[serde(default)]
    pub tools: ToolSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,

    /// Secret used to sign session cookies. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub cookie_secret: Option<String>,
}

impl fmt::Debug for RickybotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RickybotConfig")
            .field("server", &self.server)
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("session", &self.session)
            .field("notifications", &self.notifications)
            .field(
                "cookie_secret",
                &self.cookie_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Listen address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Agent backend and tool-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Base URL of the Ollama server.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Maximum provider rounds per turn before the tool loop gives up.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Number of trailing history messages sent with each request.
    #[serde(default = "default_message_window")]
    pub message_window: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_system_prompt() -> String {
    "You are Rickybot, a helpful assistant. Use the calculator tools for arithmetic \
     and answer concisely."
        .to_string()
}

fn default_max_steps() -> u32 {
    10
}

fn default_message_window() -> usize {
    40
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            max_steps: default_max_steps(),
            message_window: default_message_window(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Remote tool endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Prefix the tool name is appended to, e.g. `http://host/tool/calculator.add`.
    #[serde(default = "default_tool_base_url")]
    pub base_url: String,

    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,

    /// When false no tools are advertised to the model.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_tool_base_url() -> String {
    "http://localhost:8080/tool/".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            base_url: default_tool_base_url(),
            timeout_secs: default_tool_timeout_secs(),
            enabled: true,
        }
    }
}

/// Per-session engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Turns accepted but not yet finished processing.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Sessions idle this long are removed. Matches the cookie lifetime;
    /// 0 keeps sessions until shutdown.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_queue_capacity() -> usize {
    16
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Live notification delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Outbound messages buffered per subscriber before it is evicted.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_subscriber_buffer() -> usize {
    16
}

fn default_write_timeout_ms() -> u64 {
    5000
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            subscriber_buffer: default_subscriber_buffer(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}
