//! ToolExecutor trait definition.
//!
//! A tool executor advertises tool definitions to the model and runs the
//! calls the model makes. Failures are returned as `ToolError`; the tool loop
//! turns them into error-flagged tool responses rather than aborting.

use std::future::Future;
use std::sync::Arc;

use rickybot_types::error::ToolError;
use rickybot_types::llm::{ToolCall, ToolDefinition};

/// Trait for tool backends (remote HTTP tools, the in-process calculator, ...).
pub trait ToolExecutor: Send + Sync {
    /// Tools advertised to the model with every request.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run one tool call and return its textual output.
    fn execute(&self, call: &ToolCall) -> impl Future<Output = Result<String, ToolError>> + Send;
}

impl<T: ToolExecutor> ToolExecutor for Arc<T> {
    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }

    fn execute(&self, call: &ToolCall) -> impl Future<Output = Result<String, ToolError>> + Send {
        (**self).execute(call)
    }
}

/// Executor used when tool dispatch is disabled: advertises nothing and
/// rejects every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTools;

impl ToolExecutor for NoTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        Err(ToolError::UnknownTool(call.name.clone()))
    }
}

/// Render a numeric tool result with six decimal places.
pub fn format_numeric_result(value: f64) -> String {
    format!("{value:.6}")
}
