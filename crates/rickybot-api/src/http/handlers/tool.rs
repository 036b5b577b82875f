//! Built-in calculator tool endpoint.
//!
//! `POST /tool/{name}` with a JSON `{"a": .., "b": ..}` body always answers
//! 200 with `{"result": <number>, "error": <string>}`, the shape the remote
//! tool executor expects. Failures (division by zero, unknown operation, bad
//! arguments) go in `error`.

use axum::Json;
use axum::extract::Path;
use serde::Serialize;

use rickybot_core::tool::calculator;

#[derive(Debug, Serialize)]
pub struct ToolReplyBody {
    pub result: f64,
    pub error: String,
}

/// POST /tool/{name} - Evaluate a calculator operation.
pub async fn call_tool(
    Path(name): Path<String>,
    Json(arguments): Json<serde_json::Value>,
) -> Json<ToolReplyBody> {
    let reply = match calculator::evaluate(&name, &arguments) {
        Ok(result) => ToolReplyBody {
            result,
            error: String::new(),
        },
        Err(e) => {
            tracing::debug!(tool = %name, error = %e, "Calculator call failed");
            ToolReplyBody {
                result: 0.0,
                error: e.to_string(),
            }
        }
    };
    Json(reply)
}
