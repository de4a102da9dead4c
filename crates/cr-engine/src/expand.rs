//! Expansion of parser chunks into wire events.

use cr_protocol::{ContentChunk, ToolChunk, UiChunk};
use serde_json::{json, Value};

/// Error text reported when a failed tool call carries none.
pub const DEFAULT_TOOL_ERROR: &str = "Tool execution failed";

/// Events describing one tool call.
///
/// `tool-input-available` always comes first, so a consumer never sees an
/// output for a call whose input it has not seen. A call with neither an
/// error nor an output signal stays pending after its input.
pub fn tool_events(tool: &ToolChunk, dynamic: Option<bool>) -> Vec<UiChunk> {
    let mut events = vec![UiChunk::ToolInputAvailable {
        tool_call_id: tool.tool_call_id.clone(),
        tool_name: if tool.tool_name.is_empty() {
            crate::markdown::DEFAULT_TOOL_NAME.to_string()
        } else {
            tool.tool_name.clone()
        },
        input: tool.input.clone().unwrap_or_else(|| json!({})),
        dynamic,
    }];

    if tool.is_error() {
        events.push(UiChunk::ToolOutputError {
            tool_call_id: tool.tool_call_id.clone(),
            error_text: tool
                .error_text
                .clone()
                .unwrap_or_else(|| DEFAULT_TOOL_ERROR.to_string()),
        });
    } else if tool.has_output() {
        events.push(UiChunk::ToolOutputAvailable {
            tool_call_id: tool.tool_call_id.clone(),
            output: tool.output.clone().unwrap_or(Value::Null),
        });
    }
    events
}

/// Body events for a chunk list, without `start`/`finish` framing.
///
/// All text chunks share one text stream, opened at the first text chunk
/// and closed at the end of the document. Tool events are emitted in place
/// without closing it.
pub fn chunk_body_events(chunks: &[ContentChunk]) -> Vec<UiChunk> {
    const TEXT_ID: &str = "text-1";

    let mut events = Vec::new();
    let mut text_open = false;

    for chunk in chunks {
        match chunk {
            ContentChunk::Text { value } => {
                if !text_open {
                    events.push(UiChunk::TextStart {
                        id: TEXT_ID.to_string(),
                    });
                    text_open = true;
                }
                if !value.is_empty() {
                    events.push(UiChunk::TextDelta {
                        id: TEXT_ID.to_string(),
                        delta: value.clone(),
                    });
                }
            }
            ContentChunk::Tool(tool) => events.extend(tool_events(tool, None)),
        }
    }

    if text_open {
        events.push(UiChunk::TextEnd {
            id: TEXT_ID.to_string(),
        });
    }
    events
}

/// Full event sequence for a parsed document.
pub fn chunks_to_events(message_id: &str, chunks: &[ContentChunk]) -> Vec<UiChunk> {
    let mut events = vec![UiChunk::Start {
        message_id: Some(message_id.to_string()),
        message_metadata: None,
    }];
    events.extend(chunk_body_events(chunks));
    events.push(UiChunk::Finish {
        message_metadata: None,
    });
    events
}

/// Like [`chunks_to_events`], with the body wrapped in a single step.
pub fn chunks_to_stepped_events(message_id: &str, chunks: &[ContentChunk]) -> Vec<UiChunk> {
    let mut events = chunks_to_events(message_id, chunks);
    let finish = events.pop();
    events.insert(1, UiChunk::StartStep);
    events.push(UiChunk::FinishStep);
    events.extend(finish);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::parse_markdown;
    use cr_protocol::{validate_sequence, ToolState};

    fn types(events: &[UiChunk]) -> Vec<String> {
        events.iter().map(|e| e.chunk_type().into_owned()).collect()
    }

    #[test]
    fn hello_world_events() {
        let chunks = parse_markdown("Hello world").unwrap();
        let events = chunks_to_events("m1", &chunks);
        assert_eq!(
            types(&events),
            vec!["start", "text-start", "text-delta", "text-delta", "text-delta", "text-end", "finish"]
        );
        let deltas: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                UiChunk::TextDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["Hello", " ", "world"]);
        validate_sequence(&events).unwrap();
    }

    #[test]
    fn tool_with_output() {
        let src = "```tool search call_1\nstate: output-available\ninput:\n  query: cats\noutput:\n  results: []\n```";
        let events = chunk_body_events(&parse_markdown(src).unwrap());
        assert_eq!(
            events,
            vec![
                UiChunk::ToolInputAvailable {
                    tool_call_id: "call_1".to_string(),
                    tool_name: "search".to_string(),
                    input: json!({"query": "cats"}),
                    dynamic: None,
                },
                UiChunk::ToolOutputAvailable {
                    tool_call_id: "call_1".to_string(),
                    output: json!({"results": []}),
                },
            ]
        );
    }

    #[test]
    fn error_state_without_text_uses_default() {
        let tool = ToolChunk {
            state: Some(ToolState::OutputError),
            ..ToolChunk::new("c1", "search")
        };
        let events = tool_events(&tool, None);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            UiChunk::ToolOutputError {
                tool_call_id: "c1".to_string(),
                error_text: DEFAULT_TOOL_ERROR.to_string(),
            }
        );
    }

    #[test]
    fn error_wins_over_output() {
        let tool = ToolChunk {
            output: Some(json!(1)),
            error_text: Some("bad".to_string()),
            ..ToolChunk::new("c1", "x")
        };
        let events = tool_events(&tool, None);
        assert!(matches!(events[1], UiChunk::ToolOutputError { .. }));
    }

    #[test]
    fn output_state_without_value_sends_null() {
        let tool = ToolChunk {
            state: Some(ToolState::OutputAvailable),
            ..ToolChunk::new("c1", "x")
        };
        let events = tool_events(&tool, None);
        assert_eq!(
            events[1],
            UiChunk::ToolOutputAvailable {
                tool_call_id: "c1".to_string(),
                output: Value::Null,
            }
        );
    }

    #[test]
    fn pending_tool_only_has_input() {
        let events = tool_events(&ToolChunk::new("c1", "x"), None);
        assert_eq!(
            events,
            vec![UiChunk::ToolInputAvailable {
                tool_call_id: "c1".to_string(),
                tool_name: "x".to_string(),
                input: json!({}),
                dynamic: None,
            }]
        );
    }

    #[test]
    fn tools_interleave_inside_open_text() {
        let src = "Look:\n```tool a id=1\noutput: 2\n```\ndone";
        let events = chunks_to_events("m", &parse_markdown(src).unwrap());
        assert_eq!(
            types(&events),
            vec![
                "start",
                "text-start",
                "text-delta",
                "text-delta",
                "tool-input-available",
                "tool-output-available",
                "text-delta",
                "text-end",
                "finish"
            ]
        );
        validate_sequence(&events).unwrap();
    }

    #[test]
    fn tool_only_document_has_no_text_stream() {
        let events = chunks_to_events("m", &parse_markdown("```tool a\n```").unwrap());
        assert_eq!(types(&events), vec!["start", "tool-input-available", "finish"]);
    }

    #[test]
    fn stepped_events_wrap_body() {
        let events = chunks_to_stepped_events("m", &parse_markdown("Hi").unwrap());
        assert_eq!(
            types(&events),
            vec!["start", "start-step", "text-start", "text-delta", "text-end", "finish-step", "finish"]
        );
        validate_sequence(&events).unwrap();
    }
}
