//! Calculator Tool Implementation
//!
//! Exposes `add_numbers`, which returns the IEEE-754 double sum of its two
//! numeric arguments.

use crate::core::server::{MCPTool, ToolHandler, ToolRegistry};
use serde_json::{Value, json};

pub const TOOL_NAME: &str = "add_numbers";

/// Add two numbers. Plain floating-point addition, no rounding.
pub fn add(a: f64, b: f64) -> f64 {
    a + b
}

/// The tool definition advertised in tools/list.
pub fn definition() -> MCPTool {
    MCPTool {
        name: TOOL_NAME.to_string(),
        description: "Add two numbers together.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "a": {
                    "type": "number",
                    "title": "A",
                    "description": "First number to add"
                },
                "b": {
                    "type": "number",
                    "title": "B",
                    "description": "Second number to add"
                }
            },
            "required": ["a", "b"]
        }),
        output_schema: Some(json!({
            "type": "object",
            "properties": {
                "result": { "type": "number", "title": "Result" }
            },
            "required": ["result"]
        })),
    }
}

fn number_arg(args: &Value, name: &str) -> Result<f64, String> {
    args.get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("Missing required parameter: {}", name))
}

/// Register the add_numbers tool with the tool registry.
pub fn register(registry: &mut ToolRegistry) {
    // Arguments arrive schema-checked; the lookups only guard direct calls.
    let handler: ToolHandler = Box::new(|args: Value| -> Result<Value, String> {
        let a = number_arg(&args, "a")?;
        let b = number_arg(&args, "b")?;
        let sum = add(a, b);
        // JSON has no representation for infinities.
        if !sum.is_finite() {
            return Err(format!("sum of {} and {} is not a finite number", a, b));
        }
        Ok(json!(sum))
    });

    registry.register(definition(), handler);
}
