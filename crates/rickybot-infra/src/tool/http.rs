//! Remote tool dispatch over HTTP.
//!
//! Each tool call is a `POST {base_url}{tool_name}` whose body is the JSON
//! arguments object. The endpoint answers with `{"result": <number>,
//! "error": <string>}`; a non-empty `error` wins over the result.

use std::time::Duration;

use serde::Deserialize;

use rickybot_core::tool::calculator;
use rickybot_core::tool::executor::{ToolExecutor, format_numeric_result};
use rickybot_types::error::ToolError;
use rickybot_types::llm::{ToolCall, ToolDefinition};

/// Reply body of a remote tool endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ToolReply {
    #[serde(default)]
    pub result: f64,
    #[serde(default)]
    pub error: String,
}

/// Interpret a tool endpoint's status and body.
///
/// An error string in the body is surfaced verbatim even on an error status,
/// so the model sees e.g. "Division by zero is not allowed".
pub fn interpret_reply(status: u16, body: &[u8]) -> Result<String, ToolError> {
    let parsed = serde_json::from_slice::<ToolReply>(body);

    if let Ok(reply) = &parsed {
        if !reply.error.is_empty() {
            return Err(ToolError::Execution(reply.error.clone()));
        }
    }
    if !(200..300).contains(&status) {
        return Err(ToolError::Status { status });
    }

    parsed
        .map(|reply| format_numeric_result(reply.result))
        .map_err(|e| ToolError::MalformedResponse(e.to_string()))
}

/// Executes tool calls against a remote HTTP endpoint.
pub struct HttpToolExecutor {
    client: reqwest::Client,
    base_url: String,
    definitions: Vec<ToolDefinition>,
}

impl HttpToolExecutor {
    /// Create an executor posting to `base_url` (e.g. `http://localhost:8080/tool/`).
    ///
    /// Advertises the calculator tools until [`with_definitions`](Self::with_definitions)
    /// says otherwise.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Network(format!("failed to create http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            definitions: calculator::definitions(),
        })
    }

    pub fn with_definitions(mut self, definitions: Vec<ToolDefinition>) -> Self {
        self.definitions = definitions;
        self
    }

    fn url(&self, tool_name: &str) -> String {
        format!("{}{}", self.base_url, tool_name)
    }
}

impl ToolExecutor for HttpToolExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        let body = serde_json::to_vec(&call.arguments)
            .map_err(|e| ToolError::Arguments(e.to_string()))?;

        tracing::debug!(tool = %call.name, "calling remote tool");

        let response = self
            .client
            .post(self.url(&call.name))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;

        let outcome = interpret_reply(status, &bytes);
        if let Err(e) = &outcome {
            tracing::warn!(tool = %call.name, status, error = %e, "remote tool call failed");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn reply_result_is_formatted() {
        assert_eq!(
            interpret_reply(200, br#"{"result":4,"error":""}"#).unwrap(),
            "4.000000"
        );
    }

    #[test]
    fn reply_error_wins_over_result() {
        let err = interpret_reply(200, br#"{"result":0,"error":"Division by zero is not allowed"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "Division by zero is not allowed");
    }

    #[test]
    fn reply_error_surfaces_on_bad_status() {
        let err = interpret_reply(400, br#"{"error":"bad input"}"#).unwrap_err();
        assert!(matches!(err, ToolError::Execution(msg) if msg == "bad input"));
    }

    #[test]
    fn bad_status_without_error_body() {
        let err = interpret_reply(503, b"unavailable").unwrap_err();
        assert!(matches!(err, ToolError::Status { status: 503 }));
    }

    #[test]
    fn malformed_body_on_success() {
        let err = interpret_reply(200, b"not json").unwrap_err();
        assert!(matches!(err, ToolError::MalformedResponse(_)));
    }

    #[test]
    fn advertises_calculator_by_default() {
        let executor = HttpToolExecutor::new("http://localhost:8080/tool/", Duration::from_secs(1))
            .unwrap();
        let names: Vec<String> = executor.definitions().into_iter().map(|d| d.name).collect();
        assert!(names.contains(&"calculator.add".to_string()));
        assert_eq!(executor.url("calculator.add"), "http://localhost:8080/tool/calculator.add");

        let executor = executor.with_definitions(Vec::new());
        assert!(executor.definitions().is_empty());
    }

    #[tokio::test]
    async fn posts_arguments_to_tool_url() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 16 * 1024];
            let mut request = Vec::new();
            // Read until the JSON body has arrived.
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request.ends_with(b"}") {
                    break;
                }
            }
            let body = r#"{"result":6,"error":""}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        let executor =
            HttpToolExecutor::new(&format!("http://{addr}/tool/"), Duration::from_secs(5)).unwrap();
        let call = ToolCall {
            id: None,
            name: "calculator.multiply".to_string(),
            arguments: serde_json::json!({"a": 2, "b": 3}),
        };
        assert_eq!(executor.execute(&call).await.unwrap(), "6.000000");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /tool/calculator.multiply "));
        assert!(request.contains(r#""a":2"#));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let executor =
            HttpToolExecutor::new(&format!("http://{addr}/tool/"), Duration::from_secs(2)).unwrap();
        let call = ToolCall {
            id: None,
            name: "calculator.add".to_string(),
            arguments: serde_json::json!({"a": 1, "b": 1}),
        };
        assert!(matches!(
            executor.execute(&call).await,
            Err(ToolError::Network(_))
        ));
    }
}
