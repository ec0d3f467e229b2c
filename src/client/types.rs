use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Implementation {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

impl ToolInfo {
    /// Parameter names declared in the input schema, sorted by name.
    pub fn parameter_names(&self) -> Vec<String> {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolInfo>,
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(rename = "structuredContent", default)]
    pub structured_content: Option<Value>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// All text blocks, in order.
    pub fn texts(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The numeric `result` from structured content, falling back to the
    /// first text block.
    pub fn number(&self) -> Option<f64> {
        self.structured_content
            .as_ref()
            .and_then(|s| s.get("result"))
            .and_then(Value::as_f64)
            .or_else(|| self.texts().first().and_then(|t| t.trim().parse().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_result_reads_number_from_either_source() {
        let structured: CallToolResult = serde_json::from_value(json!({
            "content": [{ "type": "text", "text": "39.8" }],
            "structuredContent": { "result": 39.8 },
            "isError": false
        }))
        .unwrap();
        assert_eq!(structured.number(), Some(39.8));

        let text_only: CallToolResult = serde_json::from_value(json!({
            "content": [{ "type": "text", "text": "7" }]
        }))
        .unwrap();
        assert_eq!(text_only.number(), Some(7.0));
        assert!(!text_only.is_error);
    }

    #[test]
    fn unknown_content_types_are_tolerated() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                { "type": "audio", "data": "..." },
                { "type": "text", "text": "ok" }
            ]
        }))
        .unwrap();
        assert_eq!(result.content[0], ContentBlock::Other);
        assert_eq!(result.texts(), vec!["ok"]);
    }

    #[test]
    fn parameter_names_follow_schema() {
        let tool: ToolInfo = serde_json::from_value(json!({
            "name": "add_numbers",
            "inputSchema": { "properties": { "a": {}, "b": {} } }
        }))
        .unwrap();
        assert_eq!(tool.parameter_names(), vec!["a", "b"]);
        assert!(tool.description.is_none());

        let reversed: ToolInfo = serde_json::from_value(json!({
            "name": "t",
            "inputSchema": { "properties": { "y": {}, "x": {} } }
        }))
        .unwrap();
        assert_eq!(reversed.parameter_names(), vec!["x", "y"]);
    }
}
