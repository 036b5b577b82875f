//! Tool-dispatching agent loop.
//!
//! `ToolLoopAgent` drives an [`LlmProvider`] round by round. Text is forwarded
//! as it streams; when a round ends with tool calls, each call is executed
//! through a [`ToolExecutor`], the results are appended to the conversation,
//! and the provider is called again. The loop ends when a round produces no
//! tool calls, or fails once `max_steps` rounds have been spent.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tracing::{debug, info, info_span, warn};

use rickybot_types::agent::{AgentError, AgentEvent, AgentRequest};
use rickybot_types::chat::ToolResponse;
use rickybot_types::error::ToolError;
use rickybot_types::llm::{CompletionRequest, LlmError, Message, MessageRole, StreamEvent, ToolCall};

use crate::llm::provider::LlmProvider;
use crate::tool::executor::ToolExecutor;

use super::{Agent, AgentStream};

/// Settings for one [`ToolLoopAgent`].
#[derive(Debug, Clone)]
pub struct ToolLoopConfig {
    pub model: String,
    /// Prepended to every request. When empty, the first system message found
    /// in the history is used instead.
    pub system_prompt: String,
    pub max_steps: u32,
    /// Trailing non-system history messages sent with each request.
    pub message_window: usize,
}

/// Agent that alternates between provider rounds and tool execution.
pub struct ToolLoopAgent<P, T> {
    provider: Arc<P>,
    tools: Arc<T>,
    config: Arc<ToolLoopConfig>,
}

impl<P, T> ToolLoopAgent<P, T>
where
    P: LlmProvider + 'static,
    T: ToolExecutor + 'static,
{
    pub fn new(provider: P, tools: T, config: ToolLoopConfig) -> Self {
        Self {
            provider: Arc::new(provider),
            tools: Arc::new(tools),
            config: Arc::new(config),
        }
    }

    /// Assemble the opening conversation for a request.
    fn build_messages(&self, request: AgentRequest) -> Vec<Message> {
        let (system, rest): (Vec<Message>, Vec<Message>) = request
            .history
            .into_iter()
            .partition(|m| m.role == MessageRole::System);

        let mut messages = Vec::with_capacity(rest.len().min(self.config.message_window) + 2);
        if !self.config.system_prompt.is_empty() {
            messages.push(Message::system(&self.config.system_prompt));
        } else if let Some(first) = system.into_iter().next() {
            messages.push(first);
        }

        // A window must not open on tool results cut off from their call.
        let mut skip = rest.len().saturating_sub(self.config.message_window);
        while rest.get(skip).is_some_and(|m| m.role == MessageRole::Tool) {
            skip += 1;
        }
        messages.extend(rest.into_iter().skip(skip));
        messages.push(Message::user(request.user_message));
        messages
    }
}

impl<P, T> Agent for ToolLoopAgent<P, T>
where
    P: LlmProvider + 'static,
    T: ToolExecutor + 'static,
{
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn generate(&self, request: AgentRequest) -> AgentStream {
        let provider = Arc::clone(&self.provider);
        let tools = Arc::clone(&self.tools);
        let config = Arc::clone(&self.config);
        let mut messages = self.build_messages(request);

        let span = info_span!(
            "gen_ai.invoke_agent",
            gen_ai.system = provider.name(),
            gen_ai.request.model = %config.model,
            gen_ai.request.max_steps = config.max_steps,
        );

        let stream = async_stream::try_stream! {
            let definitions = tools.definitions();
            let mut step = 0u32;

            loop {
                if step >= config.max_steps {
                    Err::<(), AgentError>(AgentError::MaxStepsExceeded(config.max_steps))?;
                }
                step += 1;

                let request = CompletionRequest {
                    model: config.model.clone(),
                    messages: messages.clone(),
                    tools: definitions.clone(),
                    temperature: None,
                };
                debug!(step, messages = request.messages.len(), "Sending provider round");

                let mut events = provider.stream(request);
                let mut round_text = String::new();
                let mut calls: Vec<ToolCall> = Vec::new();
                let mut done = false;

                while let Some(event) = events.next().await {
                    match event? {
                        StreamEvent::TextDelta { text } => {
                            if text.is_empty() {
                                continue;
                            }
                            round_text.push_str(&text);
                            yield AgentEvent::ContentDelta { text };
                        }
                        StreamEvent::ToolCalls { calls: requested } => calls.extend(requested),
                        StreamEvent::Done => {
                            done = true;
                            break;
                        }
                    }
                }

                if !done {
                    Err::<(), AgentError>(
                        LlmError::Stream("provider stream ended before completion".to_string()).into(),
                    )?;
                }

                if calls.is_empty() {
                    yield AgentEvent::Completed { message: round_text };
                    break;
                }

                messages.push(Message::assistant_tool_calls(round_text, calls.clone()));
                for call in calls {
                    info!(tool = %call.name, arguments = %call.arguments, "Tool call requested");
                    yield AgentEvent::ToolCallRequested { call: call.clone() };
                    yield AgentEvent::ToolExecutionStarted { tool_name: call.name.clone() };

                    let response = run_tool(tools.as_ref(), &call).await;
                    messages.push(Message::tool_result(&call.name, &response.content));
                    yield AgentEvent::ToolExecutionFinished { response };
                }
            }
        };

        Box::pin(StreamInSpan {
            inner: Box::pin(stream),
            span,
        })
    }
}

/// Execute one call, folding any failure into an error-flagged response.
async fn run_tool<T: ToolExecutor>(tools: &T, call: &ToolCall) -> ToolResponse {
    let arguments = call.arguments.to_string();
    match tools.execute(call).await {
        Ok(content) => {
            info!(tool = %call.name, result = %content, "Tool call processed");
            ToolResponse {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                arguments,
                content,
                is_error: false,
            }
        }
        Err(err) => {
            warn!(tool = %call.name, error = %err, "Tool call failed");
            let content = match err {
                ToolError::Execution(message) => message,
                other => format!("Error calling tool {}: {other}", call.name),
            };
            ToolResponse {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                arguments,
                content,
                is_error: true,
            }
        }
    }
}

/// Keeps the agent span entered while the stream is polled.
struct StreamInSpan {
    inner: AgentStream,
    span: tracing::Span,
}

impl Stream for StreamInSpan {
    type Item = Result<AgentEvent, AgentError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let _enter = this.span.enter();
        this.inner.as_mut().poll_next(cx)
    }
}
