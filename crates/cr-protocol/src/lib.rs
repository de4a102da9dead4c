//! cr-protocol: Shared types for chat stream replay.
//!
//! This crate defines the message, part and wire-event vocabulary used
//! between the markdown parser, the replay engine and streaming clients.

pub mod chunk;
pub mod interaction;
pub mod message;
pub mod validate;

use thiserror::Error;

pub use chunk::{ContentChunk, ToolChunk, UiChunk};
pub use interaction::{Interaction, ToolCallRecord};
pub use message::{
    DataPart, FilePart, Part, Role, SourceDocumentPart, SourceUrlPart, ToolApproval, ToolPart,
    ToolState, UiMessage,
};
pub use validate::{validate_sequence, ChunkValidator, SequenceError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unsupported part type: {0}")]
    UnsupportedPart(String),
    #[error("unsupported chunk type: {0}")]
    UnsupportedChunk(String),
    #[error("`{part_type}` is missing required field `{field}`")]
    MissingField {
        part_type: String,
        field: &'static str,
    },
    #[error("invalid tool state: {0}")]
    InvalidToolState(String),
}
