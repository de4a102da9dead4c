//! Conversation messages and the parts they are made of.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Life-cycle state of a tool call.
///
/// States only move forward, in this order:
///   input-streaming -> input-available
///     -> (approval-requested -> approval-responded)?
///     -> output-available | output-error | output-denied
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    ApprovalRequested,
    ApprovalResponded,
    OutputAvailable,
    OutputError,
    OutputDenied,
}

impl ToolState {
    pub const ALL: [ToolState; 7] = [
        ToolState::InputStreaming,
        ToolState::InputAvailable,
        ToolState::ApprovalRequested,
        ToolState::ApprovalResponded,
        ToolState::OutputAvailable,
        ToolState::OutputError,
        ToolState::OutputDenied,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolState::InputStreaming => "input-streaming",
            ToolState::InputAvailable => "input-available",
            ToolState::ApprovalRequested => "approval-requested",
            ToolState::ApprovalResponded => "approval-responded",
            ToolState::OutputAvailable => "output-available",
            ToolState::OutputError => "output-error",
            ToolState::OutputDenied => "output-denied",
        }
    }

    /// Position in the forward order. Terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            ToolState::InputStreaming => 0,
            ToolState::InputAvailable => 1,
            ToolState::ApprovalRequested => 2,
            ToolState::ApprovalResponded => 3,
            ToolState::OutputAvailable | ToolState::OutputError | ToolState::OutputDenied => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 4
    }

    /// Whether moving from `self` to `next` respects the forward order.
    pub fn can_advance_to(self, next: ToolState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for ToolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ProtocolError::InvalidToolState(s.to_string()))
    }
}

/// Approval request attached to a tool call awaiting confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolApproval {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A tool invocation inside an assistant message.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPart {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Dynamic tools are serialized as `dynamic-tool` with an explicit name.
    pub dynamic: bool,
    pub state: ToolState,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error_text: Option<String>,
    pub approval: Option<ToolApproval>,
}

impl ToolPart {
    pub fn new(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        state: ToolState,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            dynamic: false,
            state,
            input: None,
            output: None,
            error_text: None,
            approval: None,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error_text: impl Into<String>) -> Self {
        self.error_text = Some(error_text.into());
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }

    /// The wire `type` tag of this part.
    pub fn part_type(&self) -> String {
        if self.dynamic {
            "dynamic-tool".to_string()
        } else {
            format!("tool-{}", self.tool_name)
        }
    }
}

/// A media reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilePart {
    pub media_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// A citation pointing at a URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceUrlPart {
    pub source_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A citation pointing at a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocumentPart {
    pub source_id: String,
    pub media_type: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Custom `data-<kind>` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPart {
    /// The kind without the `data-` prefix.
    pub kind: String,
    /// Identity used by consumers to merge later updates into the same part.
    pub id: Option<String>,
    pub data: Value,
    /// Point-in-time signal that consumers do not keep in message state.
    pub transient: Option<bool>,
}

impl DataPart {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            data,
            transient: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = Some(true);
        self
    }

    pub fn part_type(&self) -> String {
        format!("data-{}", self.kind)
    }

    pub fn is_transient(&self) -> bool {
        self.transient.unwrap_or(false)
    }
}

/// One semantic unit of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPart", into = "RawPart")]
pub enum Part {
    Text { text: String },
    Reasoning { text: String },
    StepStart,
    File(FilePart),
    SourceUrl(SourceUrlPart),
    SourceDocument(SourceDocumentPart),
    Tool(ToolPart),
    Data(DataPart),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Part::Reasoning { text: text.into() }
    }

    /// The wire `type` tag of this part.
    pub fn part_type(&self) -> String {
        match self {
            Part::Text { .. } => "text".to_string(),
            Part::Reasoning { .. } => "reasoning".to_string(),
            Part::StepStart => "step-start".to_string(),
            Part::File(_) => "file".to_string(),
            Part::SourceUrl(_) => "source-url".to_string(),
            Part::SourceDocument(_) => "source-document".to_string(),
            Part::Tool(tool) => tool.part_type(),
            Part::Data(data) => data.part_type(),
        }
    }
}

/// Flat wire shape shared by every part type.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawPart {
    #[serde(rename = "type")]
    part_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<ToolState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    approval: Option<ToolApproval>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transient: Option<bool>,
}

fn required<T>(value: Option<T>, part_type: &str, field: &'static str) -> Result<T, ProtocolError> {
    value.ok_or_else(|| ProtocolError::MissingField {
        part_type: part_type.to_string(),
        field,
    })
}

impl TryFrom<RawPart> for Part {
    type Error = ProtocolError;

    fn try_from(raw: RawPart) -> Result<Self, Self::Error> {
        let part_type = raw.part_type.as_str();
        match part_type {
            "text" => Ok(Part::Text {
                text: raw.text.unwrap_or_default(),
            }),
            "reasoning" => Ok(Part::Reasoning {
                text: raw.text.unwrap_or_default(),
            }),
            "step-start" => Ok(Part::StepStart),
            "file" => Ok(Part::File(FilePart {
                media_type: required(raw.media_type, part_type, "mediaType")?,
                url: required(raw.url, part_type, "url")?,
                filename: raw.filename,
            })),
            "source-url" => Ok(Part::SourceUrl(SourceUrlPart {
                source_id: required(raw.source_id, part_type, "sourceId")?,
                url: required(raw.url, part_type, "url")?,
                title: raw.title,
            })),
            "source-document" => Ok(Part::SourceDocument(SourceDocumentPart {
                source_id: required(raw.source_id, part_type, "sourceId")?,
                media_type: required(raw.media_type, part_type, "mediaType")?,
                title: required(raw.title, part_type, "title")?,
                filename: raw.filename,
            })),
            "dynamic-tool" => {
                let name = required(raw.tool_name.clone(), part_type, "toolName")?;
                Ok(Part::Tool(tool_from_raw(raw, name, true)?))
            }
            other => {
                if let Some(name) = other.strip_prefix("tool-").filter(|n| !n.is_empty()) {
                    let name = name.to_string();
                    return Ok(Part::Tool(tool_from_raw(raw, name, false)?));
                }
                if let Some(kind) = other.strip_prefix("data-").filter(|k| !k.is_empty()) {
                    return Ok(Part::Data(DataPart {
                        kind: kind.to_string(),
                        id: raw.id,
                        data: raw.data.unwrap_or(Value::Null),
                        transient: raw.transient,
                    }));
                }
                Err(ProtocolError::UnsupportedPart(other.to_string()))
            }
        }
    }
}

fn tool_from_raw(raw: RawPart, tool_name: String, dynamic: bool) -> Result<ToolPart, ProtocolError> {
    let part_type = raw.part_type.as_str();
    Ok(ToolPart {
        tool_call_id: required(raw.tool_call_id, part_type, "toolCallId")?,
        state: required(raw.state, part_type, "state")?,
        tool_name,
        dynamic,
        input: raw.input,
        output: raw.output,
        error_text: raw.error_text,
        approval: raw.approval,
    })
}

impl From<Part> for RawPart {
    fn from(part: Part) -> Self {
        let part_type = part.part_type();
        match part {
            Part::Text { text } | Part::Reasoning { text } => RawPart {
                part_type,
                text: Some(text),
                ..Default::default()
            },
            Part::StepStart => RawPart {
                part_type,
                ..Default::default()
            },
            Part::File(file) => RawPart {
                part_type,
                media_type: Some(file.media_type),
                url: Some(file.url),
                filename: file.filename,
                ..Default::default()
            },
            Part::SourceUrl(source) => RawPart {
                part_type,
                source_id: Some(source.source_id),
                url: Some(source.url),
                title: source.title,
                ..Default::default()
            },
            Part::SourceDocument(source) => RawPart {
                part_type,
                source_id: Some(source.source_id),
                media_type: Some(source.media_type),
                title: Some(source.title),
                filename: source.filename,
                ..Default::default()
            },
            Part::Tool(tool) => RawPart {
                part_type,
                tool_name: tool.dynamic.then_some(tool.tool_name),
                tool_call_id: Some(tool.tool_call_id),
                state: Some(tool.state),
                input: tool.input,
                output: tool.output,
                error_text: tool.error_text,
                approval: tool.approval,
                ..Default::default()
            },
            Part::Data(data) => RawPart {
                part_type,
                id: data.id,
                data: Some(data.data),
                transient: data.transient,
                ..Default::default()
            },
        }
    }
}

/// A conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiMessage {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl UiMessage {
    pub fn new(id: impl Into<String>, role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: id.into(),
            role,
            parts,
            metadata: None,
        }
    }

    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, vec![Part::text(text)])
    }

    pub fn assistant(id: impl Into<String>, parts: Vec<Part>) -> Self {
        Self::new(id, Role::Assistant, parts)
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Concatenation of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_parts(&self) -> impl Iterator<Item = &ToolPart> {
        self.parts.iter().filter_map(|part| match part {
            Part::Tool(tool) => Some(tool),
            _ => None,
        })
    }

    pub fn find_tool(&self, tool_call_id: &str) -> Option<&ToolPart> {
        self.tool_parts()
            .find(|tool| tool.tool_call_id == tool_call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn tool_state_order() {
        use ToolState::*;
        assert!(InputStreaming.can_advance_to(InputAvailable));
        assert!(InputAvailable.can_advance_to(ApprovalRequested));
        assert!(ApprovalRequested.can_advance_to(ApprovalResponded));
        assert!(ApprovalResponded.can_advance_to(OutputDenied));
        assert!(InputAvailable.can_advance_to(OutputAvailable));
        assert!(!OutputAvailable.can_advance_to(OutputError));
        assert!(!InputAvailable.can_advance_to(InputStreaming));
        assert!(!InputAvailable.can_advance_to(InputAvailable));
    }

    #[test]
    fn tool_state_from_str() {
        assert_eq!("output-error".parse::<ToolState>().unwrap(), ToolState::OutputError);
        assert!(matches!(
            "finished".parse::<ToolState>(),
            Err(ProtocolError::InvalidToolState(s)) if s == "finished"
        ));
        for state in ToolState::ALL {
            assert_eq!(state.as_str().parse::<ToolState>().unwrap(), state);
        }
    }

    #[test]
    fn static_tool_part_wire_shape() {
        let part = Part::Tool(
            ToolPart::new("call_1", "search", ToolState::OutputAvailable)
                .with_input(json!({"query": "cats"}))
                .with_output(json!({"results": []})),
        );
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "tool-search",
                "toolCallId": "call_1",
                "state": "output-available",
                "input": {"query": "cats"},
                "output": {"results": []}
            })
        );
        let back: Part = serde_json::from_value(value).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn dynamic_tool_part_keeps_name() {
        let value = json!({
            "type": "dynamic-tool",
            "toolName": "lookup",
            "toolCallId": "c9",
            "state": "input-available",
            "input": {}
        });
        let part: Part = serde_json::from_value(value.clone()).unwrap();
        match &part {
            Part::Tool(tool) => {
                assert!(tool.dynamic);
                assert_eq!(tool.tool_name, "lookup");
            }
            other => panic!("unexpected part {other:?}"),
        }
        assert_eq!(serde_json::to_value(&part).unwrap(), value);
    }

    #[test]
    fn data_part_wire_shape() {
        let part = Part::Data(DataPart::new("weather", json!({"temp": 21})).with_id("w1"));
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value, json!({"type": "data-weather", "id": "w1", "data": {"temp": 21}}));
    }

    #[test]
    fn unknown_part_type_rejected() {
        let err = serde_json::from_value::<Part>(json!({"type": "hologram"})).unwrap_err();
        assert!(err.to_string().contains("unsupported part type: hologram"));

        let err = serde_json::from_value::<Part>(json!({"type": "tool-"})).unwrap_err();
        assert!(err.to_string().contains("unsupported part type"));
    }

    #[test]
    fn tool_part_requires_state() {
        let err =
            serde_json::from_value::<Part>(json!({"type": "tool-x", "toolCallId": "1"})).unwrap_err();
        assert!(err.to_string().contains("state"));
    }

    #[test]
    fn source_document_requires_title() {
        let err = serde_json::from_value::<Part>(json!({
            "type": "source-document",
            "sourceId": "s1",
            "mediaType": "application/pdf"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn message_roundtrip_and_helpers() {
        let msg = UiMessage::assistant(
            "a1",
            vec![
                Part::text("Hello "),
                Part::StepStart,
                Part::Tool(ToolPart::new("t1", "weather", ToolState::InputAvailable)),
                Part::text("world"),
            ],
        )
        .with_metadata(json!({"model": "mock"}));

        assert_eq!(msg.text(), "Hello world");
        assert_eq!(msg.tool_parts().count(), 1);
        assert!(msg.find_tool("t1").is_some());
        assert!(msg.find_tool("t2").is_none());

        let json = serde_json::to_string(&msg).unwrap();
        let back: UiMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn message_without_metadata_omits_field() {
        let json = serde_json::to_string(&UiMessage::user("u1", "hi")).unwrap();
        assert!(!json.contains("metadata"));
    }
}
