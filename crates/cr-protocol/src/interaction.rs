//! Records supplied by the upstream interaction store.
//!
//! A matched interaction carries the stored output text and, when the store
//! already holds them in structured form, the tool calls made while
//! answering.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool call as stored alongside an interaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

/// A user input matched to a stored response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    #[serde(default)]
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl Interaction {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interaction_from_store_json() {
        let interaction: Interaction = serde_json::from_value(json!({
            "input": "weather in Paris?",
            "output": "It is sunny.",
            "toolCalls": [
                {"id": "call_1", "name": "weather", "input": {"city": "Paris"}, "output": {"sky": "clear"}}
            ]
        }))
        .unwrap();
        assert_eq!(interaction.tool_calls.len(), 1);
        assert_eq!(interaction.tool_calls[0].input, json!({"city": "Paris"}));
        assert!(interaction.tool_calls[0].error_text.is_none());
    }

    #[test]
    fn interaction_without_tools_omits_field() {
        let json = serde_json::to_string(&Interaction::new("hi").with_input("hello")).unwrap();
        assert!(!json.contains("toolCalls"));
    }
}
