//! LlmProvider trait definition.
//!
//! This is the abstraction every chat-completion backend implements. The
//! `stream` method returns a boxed stream so providers can be held behind
//! `Arc<dyn LlmProvider>` as well as used generically.

use std::pin::Pin;

use futures_util::Stream;

use rickybot_types::llm::{CompletionRequest, LlmError, StreamEvent};

/// Boxed stream of provider events.
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for LLM provider backends (Ollama, test doubles, ...).
///
/// Implementations live in rickybot-infra (e.g., `OllamaProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "ollama").
    fn name(&self) -> &str;

    /// Send a streaming completion request. Returns a stream of events that
    /// ends with `StreamEvent::Done` on success.
    fn stream(&self, request: CompletionRequest) -> LlmStream;
}

impl<T: LlmProvider + ?Sized> LlmProvider for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn stream(&self, request: CompletionRequest) -> LlmStream {
        (**self).stream(request)
    }
}
