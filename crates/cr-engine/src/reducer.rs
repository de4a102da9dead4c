//! Client-side accumulation of a replayed event stream back into a message.

use std::collections::HashMap;
use std::fmt::Display;

use cr_protocol::{
    ChunkValidator, Part, SequenceError, ToolPart, ToolState, UiChunk, UiMessage,
};
use futures::{Stream, StreamExt};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReduceError {
    #[error("malformed stream: {0}")]
    Sequence(#[from] SequenceError),
    #[error("stream failed: {0}")]
    Failed(String),
    #[error("stream error: {0}")]
    Stream(String),
}

/// Folds events into an assistant message, checking order as it goes.
#[derive(Debug)]
pub struct MessageReducer {
    message: UiMessage,
    validator: ChunkValidator,
    open_text: HashMap<String, usize>,
    open_reasoning: HashMap<String, usize>,
    error: Option<String>,
}

impl Default for MessageReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageReducer {
    pub fn new() -> Self {
        Self {
            message: UiMessage::assistant(String::new(), Vec::new()),
            validator: ChunkValidator::new(),
            open_text: HashMap::new(),
            open_reasoning: HashMap::new(),
            error: None,
        }
    }

    /// The message as accumulated so far.
    pub fn message(&self) -> &UiMessage {
        &self.message
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the `finish` event has been seen.
    pub fn is_finished(&self) -> bool {
        self.validator.is_finished()
    }

    pub fn push(&mut self, chunk: &UiChunk) -> Result<(), ReduceError> {
        self.validator.push(chunk)?;

        match chunk {
            UiChunk::Start {
                message_id,
                message_metadata,
            } => {
                if let Some(id) = message_id {
                    self.message.id = id.clone();
                }
                if message_metadata.is_some() {
                    self.message.metadata = message_metadata.clone();
                }
            }
            UiChunk::StartStep => self.message.parts.push(Part::StepStart),
            UiChunk::FinishStep => {}
            UiChunk::TextStart { id } => {
                self.open_text.insert(id.clone(), self.message.parts.len());
                self.message.parts.push(Part::text(""));
            }
            UiChunk::TextDelta { id, delta } => {
                if let Some(Part::Text { text }) = self
                    .open_text
                    .get(id)
                    .and_then(|&index| self.message.parts.get_mut(index))
                {
                    text.push_str(delta);
                }
            }
            UiChunk::TextEnd { id } => {
                self.open_text.remove(id);
            }
            UiChunk::ReasoningStart { id } => {
                self.open_reasoning
                    .insert(id.clone(), self.message.parts.len());
                self.message.parts.push(Part::reasoning(""));
            }
            UiChunk::ReasoningDelta { id, delta } => {
                if let Some(Part::Reasoning { text }) = self
                    .open_reasoning
                    .get(id)
                    .and_then(|&index| self.message.parts.get_mut(index))
                {
                    text.push_str(delta);
                }
            }
            UiChunk::ReasoningEnd { id } => {
                self.open_reasoning.remove(id);
            }
            UiChunk::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
                dynamic,
            } => match self.tool_mut(tool_call_id) {
                Some(tool) => {
                    tool.input = Some(input.clone());
                    if tool.state.can_advance_to(ToolState::InputAvailable) {
                        tool.state = ToolState::InputAvailable;
                    }
                }
                None => {
                    let mut tool =
                        ToolPart::new(tool_call_id.clone(), tool_name.clone(), ToolState::InputAvailable)
                            .with_input(input.clone());
                    tool.dynamic = dynamic.unwrap_or(false);
                    self.message.parts.push(Part::Tool(tool));
                }
            },
            UiChunk::ToolOutputAvailable {
                tool_call_id,
                output,
            } => {
                if let Some(tool) = self.tool_mut(tool_call_id) {
                    tool.output = Some(output.clone());
                    tool.state = ToolState::OutputAvailable;
                }
            }
            UiChunk::ToolOutputError {
                tool_call_id,
                error_text,
            } => {
                if let Some(tool) = self.tool_mut(tool_call_id) {
                    tool.error_text = Some(error_text.clone());
                    tool.state = ToolState::OutputError;
                }
            }
            UiChunk::SourceUrl(source) => self.message.parts.push(Part::SourceUrl(source.clone())),
            UiChunk::SourceDocument(source) => {
                self.message.parts.push(Part::SourceDocument(source.clone()))
            }
            UiChunk::File(file) => self.message.parts.push(Part::File(file.clone())),
            UiChunk::Data(data) => {
                if data.is_transient() {
                    return Ok(());
                }
                let existing = data.id.as_ref().and_then(|id| {
                    self.message.parts.iter_mut().find_map(|part| match part {
                        Part::Data(prev) if prev.kind == data.kind && prev.id.as_ref() == Some(id) => {
                            Some(prev)
                        }
                        _ => None,
                    })
                });
                match existing {
                    Some(prev) => prev.data = data.data.clone(),
                    None => self.message.parts.push(Part::Data(data.clone())),
                }
            }
            UiChunk::Finish { message_metadata } => {
                if message_metadata.is_some() {
                    self.message.metadata = message_metadata.clone();
                }
            }
            UiChunk::Error { error_text } => self.error = Some(error_text.clone()),
        }
        Ok(())
    }

    /// The completed message. Fails if the stream ended early or with an
    /// `error` event.
    pub fn finish(self) -> Result<UiMessage, ReduceError> {
        if let Some(error) = self.error {
            return Err(ReduceError::Failed(error));
        }
        self.validator.end()?;
        Ok(self.message)
    }

    fn tool_mut(&mut self, tool_call_id: &str) -> Option<&mut ToolPart> {
        self.message.parts.iter_mut().find_map(|part| match part {
            Part::Tool(tool) if tool.tool_call_id == tool_call_id => Some(tool),
            _ => None,
        })
    }
}

/// Drain a stream of events into a message. Reading stops at `finish`, so
/// a producer that keeps the connection open does not stall the caller.
pub async fn collect_message<S, E>(stream: S) -> Result<UiMessage, ReduceError>
where
    S: Stream<Item = Result<UiChunk, E>>,
    E: Display,
{
    let mut reducer = MessageReducer::new();
    let mut stream = std::pin::pin!(stream);
    while let Some(item) = stream.next().await {
        let chunk = item.map_err(|e| ReduceError::Stream(e.to_string()))?;
        reducer.push(&chunk)?;
        if reducer.is_finished() {
            break;
        }
    }
    reducer.finish()
}
