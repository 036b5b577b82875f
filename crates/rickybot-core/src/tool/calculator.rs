//! Built-in four-function calculator tools.
//!
//! Exposed to the model as `calculator.add`, `calculator.subtract`,
//! `calculator.multiply` and `calculator.divide`, each taking numeric
//! arguments `a` and `b`.

use serde::{Deserialize, Serialize};
use serde_json::json;

use rickybot_types::error::ToolError;
use rickybot_types::llm::{ToolCall, ToolDefinition};

use super::executor::{ToolExecutor, format_numeric_result};

pub const DIVISION_BY_ZERO: &str = "Division by zero is not allowed";

/// Arguments shared by every calculator tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalculatorArgs {
    pub a: f64,
    pub b: f64,
}

/// Calculator operation selected by tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Divide,
    ];

    /// Resolve a tool name such as `calculator.add`.
    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name {
            "calculator.add" => Some(Operation::Add),
            "calculator.subtract" => Some(Operation::Subtract),
            "calculator.multiply" => Some(Operation::Multiply),
            "calculator.divide" => Some(Operation::Divide),
            _ => None,
        }
    }

    pub fn tool_name(self) -> &'static str {
        match self {
            Operation::Add => "calculator.add",
            Operation::Subtract => "calculator.subtract",
            Operation::Multiply => "calculator.multiply",
            Operation::Divide => "calculator.divide",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Operation::Add => "Add two numbers",
            Operation::Subtract => "Subtract second number from first number",
            Operation::Multiply => "Multiply two numbers",
            Operation::Divide => "Divide first number by second number",
        }
    }

    pub fn apply(self, args: CalculatorArgs) -> Result<f64, ToolError> {
        let CalculatorArgs { a, b } = args;
        match self {
            Operation::Add => Ok(a + b),
            Operation::Subtract => Ok(a - b),
            Operation::Multiply => Ok(a * b),
            Operation::Divide if b == 0.0 => Err(ToolError::Execution(DIVISION_BY_ZERO.to_string())),
            Operation::Divide => Ok(a / b),
        }
    }

    fn definition(self) -> ToolDefinition {
        let (first, second) = match self {
            Operation::Divide => ("First number (dividend)", "Second number (divisor)"),
            _ => ("First number", "Second number"),
        };
        ToolDefinition {
            name: self.tool_name().to_string(),
            description: self.description().to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "a": {"type": "number", "description": first},
                    "b": {"type": "number", "description": second}
                },
                "required": ["a", "b"]
            }),
        }
    }
}

/// Definitions for all four calculator tools.
pub fn definitions() -> Vec<ToolDefinition> {
    Operation::ALL.iter().map(|op| op.definition()).collect()
}

/// Evaluate a calculator tool by name with JSON arguments.
pub fn evaluate(tool_name: &str, arguments: &serde_json::Value) -> Result<f64, ToolError> {
    let op = Operation::from_tool_name(tool_name)
        .ok_or_else(|| ToolError::UnknownTool(tool_name.to_string()))?;
    let args: CalculatorArgs = serde_json::from_value(arguments.clone())
        .map_err(|e| ToolError::Arguments(e.to_string()))?;
    op.apply(args)
}

/// In-process calculator executor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Calculator;

impl ToolExecutor for Calculator {
    fn definitions(&self) -> Vec<ToolDefinition> {
        definitions()
    }

    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        evaluate(&call.name, &call.arguments).map(format_numeric_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_each_operation() {
        let args = json!({"a": 6, "b": 3});
        assert_eq!(evaluate("calculator.add", &args).unwrap(), 9.0);
        assert_eq!(evaluate("calculator.subtract", &args).unwrap(), 3.0);
        assert_eq!(evaluate("calculator.multiply", &args).unwrap(), 18.0);
        assert_eq!(evaluate("calculator.divide", &args).unwrap(), 2.0);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = evaluate("calculator.divide", &json!({"a": 1, "b": 0})).unwrap_err();
        assert_eq!(err.to_string(), DIVISION_BY_ZERO);
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let err = evaluate("calculator.pow", &json!({"a": 1, "b": 2})).unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[test]
    fn missing_argument_is_rejected() {
        let err = evaluate("calculator.add", &json!({"a": 1})).unwrap_err();
        assert!(matches!(err, ToolError::Arguments(_)));
    }

    #[test]
    fn definitions_cover_all_operations() {
        let defs = definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "calculator.add",
                "calculator.subtract",
                "calculator.multiply",
                "calculator.divide"
            ]
        );
        assert_eq!(defs[3].parameters["required"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn calculator_executor_formats_result() {
        let call = ToolCall {
            id: None,
            name: "calculator.add".to_string(),
            arguments: json!({"a": 2, "b": 2}),
        };
        assert_eq!(Calculator.execute(&call).await.unwrap(), "4.000000");
    }
}
