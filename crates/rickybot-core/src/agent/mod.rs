//! Agent trait and implementations.
//!
//! An [`Agent`] answers one user turn as an ordered stream of
//! [`AgentEvent`]s. The session engine is written against this trait only;
//! [`tool_loop::ToolLoopAgent`] is the production implementation.

pub mod tool_loop;

use std::pin::Pin;

use futures_util::Stream;

use rickybot_types::agent::{AgentError, AgentEvent, AgentRequest};

/// Boxed stream of agent events.
pub type AgentStream = Pin<Box<dyn Stream<Item = Result<AgentEvent, AgentError>> + Send + 'static>>;

/// Trait for conversational backends driven by the session engine.
///
/// Object-safe so engines can share one `Arc<dyn Agent>`.
pub trait Agent: Send + Sync {
    /// Human-readable agent name, used in logs.
    fn name(&self) -> &str;

    /// Start answering `request`. The stream ends after `Completed` or
    /// after the first error.
    fn generate(&self, request: AgentRequest) -> AgentStream;
}
