//! Canned messages for tests and demos.

use cr_protocol::{
    DataPart, FilePart, Part, SourceDocumentPart, SourceUrlPart, ToolPart, ToolState, UiMessage,
};
use serde_json::json;

/// An assistant message with one text part per entry.
pub fn text_message(id: &str, texts: &[&str]) -> UiMessage {
    UiMessage::assistant(id, texts.iter().map(|t| Part::text(*t)).collect())
}

/// Text, a completed tool call, then a closing sentence.
pub fn tool_call_message(id: &str) -> UiMessage {
    UiMessage::assistant(
        id,
        vec![
            Part::text("Let me check the weather."),
            Part::Tool(
                ToolPart::new("call_1", "weather", ToolState::OutputAvailable)
                    .with_input(json!({"location": "Paris"}))
                    .with_output(json!({"forecast": "sunny", "temperature": 21})),
            ),
            Part::text("It is sunny in Paris."),
        ],
    )
}

/// Reasoning followed by an answer.
pub fn reasoning_then_text(id: &str, reasoning: &str, answer: &str) -> UiMessage {
    UiMessage::assistant(id, vec![Part::reasoning(reasoning), Part::text(answer)])
}

/// A failed tool call.
pub fn failed_tool_message(id: &str, error: &str) -> UiMessage {
    UiMessage::assistant(
        id,
        vec![Part::Tool(
            ToolPart::new("call_err", "search", ToolState::OutputError)
                .with_input(json!({"query": "cats"}))
                .with_error(error),
        )],
    )
}

/// One of every part kind, across two steps.
pub fn kitchen_sink(id: &str) -> UiMessage {
    UiMessage::assistant(
        id,
        vec![
            Part::reasoning("The user wants a summary."),
            Part::text("Here is what I found."),
            Part::Data(DataPart::new("status", json!("searching")).transient()),
            Part::Tool(
                ToolPart::new("call_1", "search", ToolState::OutputAvailable)
                    .with_input(json!({"query": "rust streams"}))
                    .with_output(json!({"results": 2})),
            ),
            Part::SourceUrl(SourceUrlPart {
                source_id: "src-1".to_string(),
                url: "https://example.com/streams".to_string(),
                title: Some("Streams".to_string()),
            }),
            Part::SourceDocument(SourceDocumentPart {
                source_id: "src-2".to_string(),
                media_type: "application/pdf".to_string(),
                title: "Async book".to_string(),
                filename: Some("async.pdf".to_string()),
            }),
            Part::StepStart,
            Part::File(FilePart {
                media_type: "image/png".to_string(),
                url: "https://example.com/chart.png".to_string(),
                filename: None,
            }),
            Part::Data(DataPart::new("summary", json!({"words": 42})).with_id("sum-1")),
            Part::text("That is all."),
        ],
    )
    .with_metadata(json!({"model": "replay"}))
}
