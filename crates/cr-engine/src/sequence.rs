//! Part-driven event sequencing.
//!
//! Turns a resolved assistant message into the ordered event sequence a
//! streaming client expects:
//!
//!   start
//!   start-step                  (opened lazily before the first text/reasoning)
//!   text-start / text-delta / text-end
//!   reasoning-start / reasoning-delta / reasoning-end
//!   tool-input-available [tool-output-available | tool-output-error]
//!   finish-step                 (on each step-start part and at the end)
//!   finish

use cr_protocol::{Part, ToolChunk, UiChunk, UiMessage};
use serde::{Deserialize, Serialize};

use crate::expand::tool_events;
use crate::markdown::tokenize_text;

/// How text and reasoning parts are split into deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextGranularity {
    /// One delta per part.
    #[default]
    Whole,
    /// One delta per word or whitespace run.
    Words,
}

#[derive(Debug)]
struct Sequencer {
    granularity: TextGranularity,
    text_ids: usize,
    reasoning_ids: usize,
    step_open: bool,
    events: Vec<UiChunk>,
}

impl Sequencer {
    fn new(granularity: TextGranularity) -> Self {
        Self {
            granularity,
            text_ids: 0,
            reasoning_ids: 0,
            step_open: false,
            events: Vec::new(),
        }
    }

    fn ensure_step(&mut self) {
        if !self.step_open {
            self.events.push(UiChunk::StartStep);
            self.step_open = true;
        }
    }

    fn close_step(&mut self) {
        if self.step_open {
            self.events.push(UiChunk::FinishStep);
            self.step_open = false;
        }
    }

    fn deltas(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        match self.granularity {
            TextGranularity::Whole => vec![text.to_string()],
            TextGranularity::Words => tokenize_text(text),
        }
    }

    fn text(&mut self, text: &str) {
        self.ensure_step();
        self.text_ids += 1;
        let id = format!("text-{}", self.text_ids);
        self.events.push(UiChunk::TextStart { id: id.clone() });
        for delta in self.deltas(text) {
            self.events.push(UiChunk::TextDelta {
                id: id.clone(),
                delta,
            });
        }
        self.events.push(UiChunk::TextEnd { id });
    }

    fn reasoning(&mut self, text: &str) {
        self.ensure_step();
        self.reasoning_ids += 1;
        let id = format!("reasoning-{}", self.reasoning_ids);
        self.events.push(UiChunk::ReasoningStart { id: id.clone() });
        for delta in self.deltas(text) {
            self.events.push(UiChunk::ReasoningDelta {
                id: id.clone(),
                delta,
            });
        }
        self.events.push(UiChunk::ReasoningEnd { id });
    }

    fn part(&mut self, part: &Part) {
        match part {
            Part::Text { text } => self.text(text),
            Part::Reasoning { text } => self.reasoning(text),
            Part::StepStart => {
                self.close_step();
                self.ensure_step();
            }
            Part::File(file) => self.events.push(UiChunk::File(file.clone())),
            Part::SourceUrl(source) => self.events.push(UiChunk::SourceUrl(source.clone())),
            Part::SourceDocument(source) => {
                self.events.push(UiChunk::SourceDocument(source.clone()))
            }
            Part::Tool(tool) => {
                let dynamic = tool.dynamic.then_some(true);
                self.events
                    .extend(tool_events(&ToolChunk::from(tool), dynamic));
            }
            Part::Data(data) => self.events.push(UiChunk::Data(data.clone())),
        }
    }
}

/// Event sequence for a message with whole-part text deltas.
pub fn message_to_events(message: &UiMessage) -> Vec<UiChunk> {
    message_to_events_with(message, TextGranularity::Whole)
}

pub fn message_to_events_with(message: &UiMessage, granularity: TextGranularity) -> Vec<UiChunk> {
    let mut seq = Sequencer::new(granularity);
    seq.events.push(UiChunk::Start {
        message_id: Some(message.id.clone()),
        message_metadata: message.metadata.clone(),
    });
    for part in &message.parts {
        seq.part(part);
    }
    seq.close_step();
    seq.events.push(UiChunk::Finish {
        message_metadata: message.metadata.clone(),
    });
    seq.events
}
