//! cr-engine: markdown parsing and paced replay of chat streams.
//!
//! Source text is parsed into content chunks, expanded (or, for resolved
//! messages, sequenced) into UI events, and emitted through a cancellable
//! stream that can be framed as Server-Sent Events.

pub mod delay;
pub mod expand;
pub mod filler;
pub mod fixtures;
pub mod markdown;
pub mod reducer;
pub mod replay;
pub mod sequence;
pub mod sse;
pub mod template;
pub mod transport;

pub use delay::DelayPolicy;
pub use expand::{chunks_to_events, chunks_to_stepped_events, DEFAULT_TOOL_ERROR};
pub use markdown::{parse_markdown, parse_markdown_with, ParseError, ParserOptions};
pub use reducer::{collect_message, MessageReducer, ReduceError};
pub use replay::{replay, replay_chunks, replay_message, ReplayError};
pub use sequence::{message_to_events, message_to_events_with, TextGranularity};
pub use sse::{encode_sse, parse_ui_stream, sse_body, SseError, DONE_FRAME};
pub use transport::{
    ChatTransport, MarkdownResolver, MessageResolver, ReplayStream, SendRequest, StaticResolver,
    Trigger, TransportError,
};
