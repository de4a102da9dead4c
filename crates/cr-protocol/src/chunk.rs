//! Wire events of the UI message stream and the parser's content chunks.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{DataPart, FilePart, SourceDocumentPart, SourceUrlPart, ToolPart, ToolState};
use crate::ProtocolError;

/// One event of the outgoing stream.
///
/// The `type` tag and the camelCase field names are the compatibility
/// surface with streaming chat clients and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChunk", into = "RawChunk")]
pub enum UiChunk {
    Start {
        message_id: Option<String>,
        message_metadata: Option<Value>,
    },
    StartStep,
    FinishStep,
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    ReasoningStart {
        id: String,
    },
    ReasoningDelta {
        id: String,
        delta: String,
    },
    ReasoningEnd {
        id: String,
    },
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        dynamic: Option<bool>,
    },
    ToolOutputAvailable {
        tool_call_id: String,
        output: Value,
    },
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    SourceUrl(SourceUrlPart),
    SourceDocument(SourceDocumentPart),
    File(FilePart),
    Data(DataPart),
    Finish {
        message_metadata: Option<Value>,
    },
    /// Terminates a stream that failed or was cancelled.
    Error {
        error_text: String,
    },
}

impl UiChunk {
    /// The wire `type` tag.
    pub fn chunk_type(&self) -> Cow<'static, str> {
        let name = match self {
            UiChunk::Start { .. } => "start",
            UiChunk::StartStep => "start-step",
            UiChunk::FinishStep => "finish-step",
            UiChunk::TextStart { .. } => "text-start",
            UiChunk::TextDelta { .. } => "text-delta",
            UiChunk::TextEnd { .. } => "text-end",
            UiChunk::ReasoningStart { .. } => "reasoning-start",
            UiChunk::ReasoningDelta { .. } => "reasoning-delta",
            UiChunk::ReasoningEnd { .. } => "reasoning-end",
            UiChunk::ToolInputAvailable { .. } => "tool-input-available",
            UiChunk::ToolOutputAvailable { .. } => "tool-output-available",
            UiChunk::ToolOutputError { .. } => "tool-output-error",
            UiChunk::SourceUrl(_) => "source-url",
            UiChunk::SourceDocument(_) => "source-document",
            UiChunk::File(_) => "file",
            UiChunk::Data(data) => return Cow::Owned(data.part_type()),
            UiChunk::Finish { .. } => "finish",
            UiChunk::Error { .. } => "error",
        };
        Cow::Borrowed(name)
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            UiChunk::ToolInputAvailable { tool_call_id, .. }
            | UiChunk::ToolOutputAvailable { tool_call_id, .. }
            | UiChunk::ToolOutputError { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    pub fn is_tool_output(&self) -> bool {
        matches!(
            self,
            UiChunk::ToolOutputAvailable { .. } | UiChunk::ToolOutputError { .. }
        )
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawChunk {
    #[serde(rename = "type")]
    chunk_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<Value>,
    // Serialized even when null: clients expect the key on output events.
    #[serde(skip_serializing_if = "Option::is_none", with = "present_null")]
    output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dynamic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transient: Option<bool>,
}

/// Keeps an explicit `null` distinguishable from an absent key.
mod present_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Option<Value>, s: S) -> Result<S::Ok, S::Error> {
        value.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
        Value::deserialize(d).map(Some)
    }
}

fn required<T>(value: Option<T>, chunk_type: &str, field: &'static str) -> Result<T, ProtocolError> {
    value.ok_or_else(|| ProtocolError::MissingField {
        part_type: chunk_type.to_string(),
        field,
    })
}

impl TryFrom<RawChunk> for UiChunk {
    type Error = ProtocolError;

    fn try_from(raw: RawChunk) -> Result<Self, ProtocolError> {
        let ty = raw.chunk_type.as_str();
        let chunk = match ty {
            "start" => UiChunk::Start {
                message_id: raw.message_id,
                message_metadata: raw.message_metadata,
            },
            "start-step" => UiChunk::StartStep,
            "finish-step" => UiChunk::FinishStep,
            "text-start" => UiChunk::TextStart {
                id: required(raw.id, ty, "id")?,
            },
            "text-delta" => UiChunk::TextDelta {
                id: required(raw.id, ty, "id")?,
                delta: raw.delta.unwrap_or_default(),
            },
            "text-end" => UiChunk::TextEnd {
                id: required(raw.id, ty, "id")?,
            },
            "reasoning-start" => UiChunk::ReasoningStart {
                id: required(raw.id, ty, "id")?,
            },
            "reasoning-delta" => UiChunk::ReasoningDelta {
                id: required(raw.id, ty, "id")?,
                delta: raw.delta.unwrap_or_default(),
            },
            "reasoning-end" => UiChunk::ReasoningEnd {
                id: required(raw.id, ty, "id")?,
            },
            "tool-input-available" => UiChunk::ToolInputAvailable {
                tool_call_id: required(raw.tool_call_id, ty, "toolCallId")?,
                tool_name: required(raw.tool_name, ty, "toolName")?,
                input: raw.input.unwrap_or(Value::Null),
                dynamic: raw.dynamic,
            },
            "tool-output-available" => UiChunk::ToolOutputAvailable {
                tool_call_id: required(raw.tool_call_id, ty, "toolCallId")?,
                output: raw.output.unwrap_or(Value::Null),
            },
            "tool-output-error" => UiChunk::ToolOutputError {
                tool_call_id: required(raw.tool_call_id, ty, "toolCallId")?,
                error_text: raw.error_text.unwrap_or_default(),
            },
            "source-url" => UiChunk::SourceUrl(SourceUrlPart {
                source_id: required(raw.source_id, ty, "sourceId")?,
                url: required(raw.url, ty, "url")?,
                title: raw.title,
            }),
            "source-document" => UiChunk::SourceDocument(SourceDocumentPart {
                source_id: required(raw.source_id, ty, "sourceId")?,
                media_type: required(raw.media_type, ty, "mediaType")?,
                title: required(raw.title, ty, "title")?,
                filename: raw.filename,
            }),
            "file" => UiChunk::File(FilePart {
                media_type: required(raw.media_type, ty, "mediaType")?,
                url: required(raw.url, ty, "url")?,
                filename: raw.filename,
            }),
            "finish" => UiChunk::Finish {
                message_metadata: raw.message_metadata,
            },
            "error" => UiChunk::Error {
                error_text: raw.error_text.unwrap_or_default(),
            },
            other => match other.strip_prefix("data-").filter(|k| !k.is_empty()) {
                Some(kind) => UiChunk::Data(DataPart {
                    kind: kind.to_string(),
                    id: raw.id,
                    data: raw.data.unwrap_or(Value::Null),
                    transient: raw.transient,
                }),
                None => return Err(ProtocolError::UnsupportedChunk(other.to_string())),
            },
        };
        Ok(chunk)
    }
}

impl From<UiChunk> for RawChunk {
    fn from(chunk: UiChunk) -> Self {
        let chunk_type = chunk.chunk_type().into_owned();
        let base = RawChunk {
            chunk_type,
            ..Default::default()
        };
        match chunk {
            UiChunk::Start {
                message_id,
                message_metadata,
            } => RawChunk {
                message_id,
                message_metadata,
                ..base
            },
            UiChunk::StartStep | UiChunk::FinishStep => base,
            UiChunk::TextStart { id }
            | UiChunk::TextEnd { id }
            | UiChunk::ReasoningStart { id }
            | UiChunk::ReasoningEnd { id } => RawChunk {
                id: Some(id),
                ..base
            },
            UiChunk::TextDelta { id, delta } | UiChunk::ReasoningDelta { id, delta } => RawChunk {
                id: Some(id),
                delta: Some(delta),
                ..base
            },
            UiChunk::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
                dynamic,
            } => RawChunk {
                tool_call_id: Some(tool_call_id),
                tool_name: Some(tool_name),
                input: Some(input),
                dynamic,
                ..base
            },
            UiChunk::ToolOutputAvailable {
                tool_call_id,
                output,
            } => RawChunk {
                tool_call_id: Some(tool_call_id),
                output: Some(output),
                ..base
            },
            UiChunk::ToolOutputError {
                tool_call_id,
                error_text,
            } => RawChunk {
                tool_call_id: Some(tool_call_id),
                error_text: Some(error_text),
                ..base
            },
            UiChunk::SourceUrl(source) => RawChunk {
                source_id: Some(source.source_id),
                url: Some(source.url),
                title: source.title,
                ..base
            },
            UiChunk::SourceDocument(source) => RawChunk {
                source_id: Some(source.source_id),
                media_type: Some(source.media_type),
                title: Some(source.title),
                filename: source.filename,
                ..base
            },
            UiChunk::File(file) => RawChunk {
                media_type: Some(file.media_type),
                url: Some(file.url),
                filename: file.filename,
                ..base
            },
            UiChunk::Data(data) => RawChunk {
                id: data.id,
                data: Some(data.data),
                transient: data.transient,
                ..base
            },
            UiChunk::Finish { message_metadata } => RawChunk {
                message_metadata,
                ..base
            },
            UiChunk::Error { error_text } => RawChunk {
                error_text: Some(error_text),
                ..base
            },
        }
    }
}

/// A tool call declared in source markdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolChunk {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ToolState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

impl ToolChunk {
    pub fn new(tool_call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            state: None,
            input: None,
            output: None,
            error_text: None,
        }
    }

    /// The call failed: explicit error state or error text present.
    pub fn is_error(&self) -> bool {
        self.state == Some(ToolState::OutputError) || self.error_text.is_some()
    }

    /// The call produced output: explicit state or output value present.
    pub fn has_output(&self) -> bool {
        self.state == Some(ToolState::OutputAvailable) || self.output.is_some()
    }

    /// State implied by the signals present on the chunk.
    pub fn resolved_state(&self) -> ToolState {
        if self.is_error() {
            ToolState::OutputError
        } else if self.has_output() {
            ToolState::OutputAvailable
        } else {
            self.state.unwrap_or(ToolState::InputAvailable)
        }
    }
}

impl From<&ToolPart> for ToolChunk {
    fn from(tool: &ToolPart) -> Self {
        Self {
            tool_call_id: tool.tool_call_id.clone(),
            tool_name: tool.tool_name.clone(),
            state: Some(tool.state),
            input: tool.input.clone(),
            output: tool.output.clone(),
            error_text: tool.error_text.clone(),
        }
    }
}

/// Parser output: a prose token or a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentChunk {
    Text { value: String },
    Tool(ToolChunk),
}

impl ContentChunk {
    pub fn text(value: impl Into<String>) -> Self {
        ContentChunk::Text {
            value: value.into(),
        }
    }
}
