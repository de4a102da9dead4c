//! Conversions between messages, parser chunks and markdown templates.
//!
//! `message_to_markdown` renders a message back into the fenced-tool
//! markdown accepted by the parser, so a replayed conversation can be copied
//! and edited as a template.

use cr_protocol::{ContentChunk, Interaction, Part, ToolChunk, ToolPart, UiMessage};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::markdown::tokenize_text;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to encode tool block: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Tool part for a parsed tool chunk, with its state resolved from the
/// signals present.
pub fn chunk_to_tool_part(tool: &ToolChunk) -> ToolPart {
    ToolPart {
        tool_call_id: tool.tool_call_id.clone(),
        tool_name: tool.tool_name.clone(),
        dynamic: false,
        state: tool.resolved_state(),
        input: tool.input.clone(),
        output: tool.output.clone(),
        error_text: tool.error_text.clone(),
        approval: None,
    }
}

/// Merge consecutive text chunks into text parts; tool chunks become tool
/// parts.
pub fn chunks_to_parts(chunks: &[ContentChunk]) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut text = String::new();

    for chunk in chunks {
        match chunk {
            ContentChunk::Text { value } => text.push_str(value),
            ContentChunk::Tool(tool) => {
                if !text.is_empty() {
                    parts.push(Part::text(std::mem::take(&mut text)));
                }
                parts.push(Part::Tool(chunk_to_tool_part(tool)));
            }
        }
    }
    if !text.is_empty() {
        parts.push(Part::text(text));
    }
    parts
}

/// Parser-style chunks for a message. Text is split into word tokens;
/// parts other than text and tools have no chunk form and are skipped.
pub fn message_to_chunks(message: &UiMessage) -> Vec<ContentChunk> {
    let mut chunks = Vec::new();
    for part in &message.parts {
        match part {
            Part::Text { text } => chunks.extend(
                tokenize_text(text)
                    .into_iter()
                    .map(|value| ContentChunk::Text { value }),
            ),
            Part::Tool(tool) => chunks.push(ContentChunk::Tool(ToolChunk::from(tool))),
            _ => {}
        }
    }
    chunks
}

/// Assistant message for a matched interaction.
///
/// Structured tool calls from the store come first, followed by the stored
/// output text. Without structured tool calls `chunks` (the parsed output)
/// is used as-is.
pub fn interaction_to_message(
    id: &str,
    interaction: &Interaction,
    chunks: &[ContentChunk],
) -> UiMessage {
    if interaction.tool_calls.is_empty() {
        return UiMessage::assistant(id, chunks_to_parts(chunks));
    }

    let mut parts: Vec<Part> = interaction
        .tool_calls
        .iter()
        .map(|record| {
            let chunk = ToolChunk {
                tool_call_id: record.id.clone(),
                tool_name: record.name.clone(),
                state: None,
                input: Some(record.input.clone()),
                output: record.output.clone(),
                error_text: record.error_text.clone(),
            };
            Part::Tool(chunk_to_tool_part(&chunk))
        })
        .collect();
    if !interaction.output.is_empty() {
        parts.push(Part::text(interaction.output.clone()));
    }
    UiMessage::assistant(id, parts)
}

/// Render a message as markdown with fenced tool blocks.
pub fn message_to_markdown(message: &UiMessage) -> Result<String, TemplateError> {
    let mut out = String::new();
    for part in &message.parts {
        match part {
            Part::Text { text } => out.push_str(text),
            Part::Tool(tool) => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&render_tool_block(tool)?);
            }
            _ => {}
        }
    }
    Ok(out)
}

fn render_tool_block(tool: &ToolPart) -> Result<String, TemplateError> {
    let mut header = String::from("tool");
    let mut body = Map::new();
    for (key, body_key, value) in [
        ("name", "toolName", &tool.tool_name),
        ("id", "toolCallId", &tool.tool_call_id),
    ] {
        if is_header_token(value) {
            header.push_str(&format!(" {key}={value}"));
        } else {
            body.insert(body_key.to_string(), Value::String(value.clone()));
        }
    }

    body.insert("state".to_string(), Value::String(tool.state.to_string()));
    if let Some(input) = &tool.input {
        body.insert("input".to_string(), input.clone());
    }
    if let Some(output) = &tool.output {
        body.insert("output".to_string(), output.clone());
    }
    if let Some(error_text) = &tool.error_text {
        body.insert("errorText".to_string(), Value::String(error_text.clone()));
    }

    let yaml = serde_yaml::to_string(&Value::Object(body))?;
    let yaml = yaml.strip_prefix("---\n").unwrap_or(&yaml);
    let fence = "`".repeat(longest_backtick_run(yaml).max(2) + 1);
    Ok(format!("{fence}{header}\n{yaml}{fence}\n"))
}

/// Values that survive the header tokenizer unchanged.
fn is_header_token(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with(['"', '\''])
        && !value.contains(|c: char| c.is_whitespace() || c == '`' || c == ']')
}

fn longest_backtick_run(text: &str) -> usize {
    text.split(|c| c != '`').map(str::len).max().unwrap_or(0)
}
