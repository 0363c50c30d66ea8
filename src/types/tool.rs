//! Assembled tool calls

use crate::Result;
use serde::{Deserialize, Serialize};

/// A complete tool call, either assembled from stream fragments or read from
/// a buffered run response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    /// Raw JSON text as produced by the model; may be partial if the stream was cut.
    #[serde(default)]
    pub arguments: String,
}

fn default_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Parse `arguments` as JSON. An empty string parses as `{}`.
    pub fn parsed_arguments(&self) -> Result<serde_json::Value> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(raw)?)
    }
}
