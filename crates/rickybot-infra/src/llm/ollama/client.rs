//! OllamaProvider -- concrete [`LlmProvider`] implementation for Ollama.
//!
//! Sends streaming requests to the Ollama chat API (`/api/chat`) and decodes
//! the NDJSON body into provider-agnostic [`StreamEvent`]s. Tool declarations
//! are forwarded in Ollama's function-calling format.

use std::time::Duration;

use futures_util::StreamExt;

use rickybot_core::llm::provider::{LlmProvider, LlmStream};
use rickybot_types::llm::{CompletionRequest, LlmError};

use super::streaming::ndjson_event_stream;
use super::types::{OllamaChatRequest, OllamaMessage, OllamaOptions, OllamaTool};

/// Ollama chat provider.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    /// Create a provider talking to `base_url` (e.g. `http://localhost:11434`).
    ///
    /// `timeout` bounds a whole generation, including the streamed body.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create http client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// The default model for this provider.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Convert a generic [`CompletionRequest`] into an [`OllamaChatRequest`].
    ///
    /// An empty model on the request falls back to the provider default.
    fn to_ollama_request(&self, request: &CompletionRequest) -> OllamaChatRequest {
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        OllamaChatRequest {
            model,
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream: true,
            tools: request.tools.iter().map(OllamaTool::from).collect(),
            options: request
                .temperature
                .map(|temperature| OllamaOptions { temperature }),
        }
    }
}

/// Map a transport failure to an [`LlmError`].
fn map_send_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Provider {
            message: format!("request failed: {err}"),
        }
    }
}

/// Pass a successful response through, or turn an error status into
/// [`LlmError::Http`] carrying the body text.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Http {
        status: status.as_u16(),
        body,
    })
}

impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn stream(&self, request: CompletionRequest) -> LlmStream {
        let body = self.to_ollama_request(&request);
        let builder = self.client.post(self.url("/api/chat")).json(&body);

        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "sending Ollama chat request"
        );

        Box::pin(async_stream::try_stream! {
            let response = builder.send().await.map_err(map_send_error)?;
            let response = check_status(response).await?;

            let mut events = ndjson_event_stream(response.bytes_stream());
            while let Some(event) = events.next().await {
                yield event?;
            }
        })
    }
}
