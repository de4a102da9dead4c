//! Life-cycle checks for a `UiChunk` sequence.
//!
//! A well-formed stream starts with `start`, never emits a delta or an end
//! outside its `*-start`/`*-end` window, never reports a tool output before
//! the tool's input, and emits nothing after `finish`.

use std::collections::HashSet;

use thiserror::Error;

use crate::chunk::UiChunk;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error("`{0}` emitted before `start`")]
    NotStarted(String),
    #[error("`{0}` emitted after `finish`")]
    AfterFinish(String),
    #[error("duplicate `start`")]
    DuplicateStart,
    #[error("{kind} stream `{id}` opened twice")]
    DuplicateStream { kind: &'static str, id: String },
    #[error("`{chunk}` for {kind} stream `{id}` outside its start/end window")]
    UnknownStream {
        kind: &'static str,
        id: String,
        chunk: String,
    },
    #[error("`start-step` while a step is already open")]
    NestedStep,
    #[error("`finish-step` without an open step")]
    UnopenedStep,
    #[error("tool output for `{0}` before its input")]
    OutputBeforeInput(String),
    #[error("tool `{0}` reported output twice")]
    DuplicateOutput(String),
    #[error("`finish` with unclosed streams: {0}")]
    UnclosedStreams(String),
    #[error("stream ended without `finish`")]
    Unfinished,
}

/// Incremental checker fed one chunk at a time.
#[derive(Debug, Default)]
pub struct ChunkValidator {
    started: bool,
    finished: bool,
    failed: bool,
    step_open: bool,
    open_text: HashSet<String>,
    open_reasoning: HashSet<String>,
    tool_inputs: HashSet<String>,
    tool_outputs: HashSet<String>,
}

impl ChunkValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &UiChunk) -> Result<(), SequenceError> {
        if let UiChunk::Error { .. } = chunk {
            self.failed = true;
            return Ok(());
        }
        let name = chunk.chunk_type();
        if self.finished {
            return Err(SequenceError::AfterFinish(name.into_owned()));
        }
        if !self.started && !matches!(chunk, UiChunk::Start { .. }) {
            return Err(SequenceError::NotStarted(name.into_owned()));
        }

        match chunk {
            UiChunk::Start { .. } => {
                if self.started {
                    return Err(SequenceError::DuplicateStart);
                }
                self.started = true;
            }
            UiChunk::StartStep => {
                if self.step_open {
                    return Err(SequenceError::NestedStep);
                }
                self.step_open = true;
            }
            UiChunk::FinishStep => {
                if !self.step_open {
                    return Err(SequenceError::UnopenedStep);
                }
                self.step_open = false;
            }
            UiChunk::TextStart { id } => open(&mut self.open_text, "text", id)?,
            UiChunk::TextDelta { id, .. } => touch(&self.open_text, "text", id, &name)?,
            UiChunk::TextEnd { id } => close(&mut self.open_text, "text", id, &name)?,
            UiChunk::ReasoningStart { id } => open(&mut self.open_reasoning, "reasoning", id)?,
            UiChunk::ReasoningDelta { id, .. } => {
                touch(&self.open_reasoning, "reasoning", id, &name)?
            }
            UiChunk::ReasoningEnd { id } => {
                close(&mut self.open_reasoning, "reasoning", id, &name)?
            }
            UiChunk::ToolInputAvailable { tool_call_id, .. } => {
                self.tool_inputs.insert(tool_call_id.clone());
            }
            UiChunk::ToolOutputAvailable { tool_call_id, .. }
            | UiChunk::ToolOutputError { tool_call_id, .. } => {
                if !self.tool_inputs.contains(tool_call_id) {
                    return Err(SequenceError::OutputBeforeInput(tool_call_id.clone()));
                }
                if !self.tool_outputs.insert(tool_call_id.clone()) {
                    return Err(SequenceError::DuplicateOutput(tool_call_id.clone()));
                }
            }
            UiChunk::Finish { .. } => {
                let mut unclosed: Vec<&str> = self
                    .open_text
                    .iter()
                    .chain(self.open_reasoning.iter())
                    .map(String::as_str)
                    .collect();
                if self.step_open {
                    unclosed.push("step");
                }
                if !unclosed.is_empty() {
                    unclosed.sort_unstable();
                    return Err(SequenceError::UnclosedStreams(unclosed.join(", ")));
                }
                self.finished = true;
            }
            UiChunk::SourceUrl(_)
            | UiChunk::SourceDocument(_)
            | UiChunk::File(_)
            | UiChunk::Data(_)
            | UiChunk::Error { .. } => {}
        }
        Ok(())
    }

    /// Whether `finish` was observed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether an `error` chunk terminated the stream.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Check the stream is complete once the producer is done.
    pub fn end(&self) -> Result<(), SequenceError> {
        if self.finished || self.failed {
            Ok(())
        } else {
            Err(SequenceError::Unfinished)
        }
    }
}

fn open(set: &mut HashSet<String>, kind: &'static str, id: &str) -> Result<(), SequenceError> {
    if set.insert(id.to_string()) {
        Ok(())
    } else {
        Err(SequenceError::DuplicateStream {
            kind,
            id: id.to_string(),
        })
    }
}

fn touch(set: &HashSet<String>, kind: &'static str, id: &str, chunk: &str) -> Result<(), SequenceError> {
    if set.contains(id) {
        Ok(())
    } else {
        Err(SequenceError::UnknownStream {
            kind,
            id: id.to_string(),
            chunk: chunk.to_string(),
        })
    }
}

fn close(
    set: &mut HashSet<String>,
    kind: &'static str,
    id: &str,
    chunk: &str,
) -> Result<(), SequenceError> {
    touch(set, kind, id, chunk)?;
    set.remove(id);
    Ok(())
}

/// Validate a complete sequence.
pub fn validate_sequence<'a>(
    chunks: impl IntoIterator<Item = &'a UiChunk>,
) -> Result<(), SequenceError> {
    let mut validator = ChunkValidator::new();
    for chunk in chunks {
        validator.push(chunk)?;
    }
    validator.end()
}
