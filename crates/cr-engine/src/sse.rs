//! Server-Sent Events framing for UI event streams.
//!
//! Each event travels as one `data: <json>` frame. A stream that finishes
//! normally is terminated by `data: [DONE]`; a failed or cancelled stream
//! ends with an `error` event instead.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_stream::stream;
use bytes::Bytes;
use cr_protocol::UiChunk;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tracing::warn;

use crate::replay::ReplayError;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";
const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Error)]
pub enum SseError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode one event as an SSE frame.
pub fn encode_sse(chunk: &UiChunk) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(chunk)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

fn error_frame(error_text: String) -> Bytes {
    encode_sse(&UiChunk::Error { error_text }).unwrap_or_else(|_| {
        Bytes::from_static(b"data: {\"type\":\"error\",\"errorText\":\"stream failed\"}\n\n")
    })
}

/// Frame a replay stream as an SSE response body.
pub fn sse_body<S>(events: S) -> impl Stream<Item = Bytes> + Send + 'static
where
    S: Stream<Item = Result<UiChunk, ReplayError>> + Send + 'static,
{
    stream! {
        let mut events = Box::pin(events);
        while let Some(item) = events.next().await {
            match item {
                Ok(chunk) => match encode_sse(&chunk) {
                    Ok(frame) => yield frame,
                    Err(e) => {
                        warn!(%e, chunk = %chunk.chunk_type(), "failed to encode event");
                        yield error_frame(e.to_string());
                        return;
                    }
                },
                Err(e) => {
                    yield error_frame(e.to_string());
                    return;
                }
            }
        }
        yield Bytes::from_static(DONE_FRAME.as_bytes());
    }
}

/// One decoded SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// The `event:` field, if present.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

#[derive(Default)]
struct FrameParser {
    line: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl FrameParser {
    fn feed(&mut self, bytes: &[u8], out: &mut VecDeque<SseFrame>) {
        for &b in bytes {
            if b == b'\n' {
                let raw = std::mem::take(&mut self.line);
                let line = String::from_utf8_lossy(&raw);
                let line = line.strip_suffix('\r').unwrap_or(&line);
                if let Some(frame) = self.line_done(line) {
                    out.push_back(frame);
                }
            } else {
                self.line.push(b);
            }
        }
    }

    fn finish(&mut self) -> Option<SseFrame> {
        if !self.line.is_empty() {
            let raw = std::mem::take(&mut self.line);
            let line = String::from_utf8_lossy(&raw).into_owned();
            self.line_done(&line);
        }
        self.take_frame()
    }

    fn line_done(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.take_frame();
        }
        // Lines without a colon and `:` comments carry nothing.
        let (field, value) = line.split_once(':')?;
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            return None;
        }
        let frame = SseFrame {
            event: self.event.take(),
            data: self.data.join("\n"),
        };
        self.data.clear();
        Some(frame)
    }
}

/// Splits a byte stream into SSE frames.
pub struct SseFrameStream<S> {
    inner: S,
    parser: FrameParser,
    pending: VecDeque<SseFrame>,
    done: bool,
}

impl<S> SseFrameStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            parser: FrameParser::default(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for SseFrameStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<SseFrame, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => this.parser.feed(&bytes, &mut this.pending),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    this.done = true;
                    if let Some(frame) = this.parser.finish() {
                        this.pending.push_back(frame);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Decode an SSE body back into UI events, stopping at `[DONE]`.
pub fn parse_ui_stream<S, E>(body: S) -> impl Stream<Item = Result<UiChunk, SseError>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    stream! {
        let mut frames = SseFrameStream::new(body);
        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    yield Err(SseError::Transport(e.to_string()));
                    return;
                }
            };
            if frame.data == DONE_MARKER {
                return;
            }
            yield serde_json::from_str::<UiChunk>(&frame.data).map_err(SseError::from);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::replay::replay_message;
    use crate::sequence::{message_to_events, TextGranularity};
    use crate::DelayPolicy;
    use tokio_util::sync::CancellationToken;

    fn bytes_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        futures::stream::iter(chunks.into_iter().map(|s| Ok(Bytes::from(s))))
    }

    async fn frames(chunks: Vec<&'static str>) -> Vec<SseFrame> {
        SseFrameStream::new(bytes_stream(chunks))
            .map(Result::unwrap)
            .collect()
            .await
    }

    #[test]
    fn encodes_data_frame() {
        let frame = encode_sse(&UiChunk::TextDelta {
            id: "text-1".to_string(),
            delta: "Hi".to_string(),
        })
        .unwrap();
        assert_eq!(
            frame,
            Bytes::from("data: {\"type\":\"text-delta\",\"id\":\"text-1\",\"delta\":\"Hi\"}\n\n")
        );
    }

    #[tokio::test]
    async fn frames_split_across_chunks() {
        let got = frames(vec!["data: hel", "lo wor", "ld\n", "\n"]).await;
        assert_eq!(
            got,
            vec![SseFrame {
                event: None,
                data: "hello world".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn frames_with_event_field_and_comments() {
        let got = frames(vec![": ping\nevent: msg\ndata: one\r\n\r\nid: 7\ndata: two\n\n"]).await;
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].event.as_deref(), Some("msg"));
        assert_eq!(got[0].data, "one");
        assert_eq!(got[1].event, None);
        assert_eq!(got[1].data, "two");
    }

    #[tokio::test]
    async fn multi_line_data_and_trailing_frame() {
        let got = frames(vec!["data: a\ndata: b\n\ndata: tail"]).await;
        assert_eq!(got[0].data, "a\nb");
        assert_eq!(got[1].data, "tail");
    }

    #[tokio::test]
    async fn multibyte_text_split_between_chunks() {
        let body: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: caf\xc3")),
            Ok(Bytes::from_static(b"\xa9\n\n")),
        ];
        let got: Vec<_> = SseFrameStream::new(futures::stream::iter(body))
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(got[0].data, "café");
    }

    #[tokio::test]
    async fn body_round_trips_through_decoder() {
        let msg = fixtures::kitchen_sink("a1");
        let events = message_to_events(&msg);
        let replay = replay_message(
            &msg,
            TextGranularity::Whole,
            DelayPolicy::None,
            CancellationToken::new(),
        );
        let body: Vec<Bytes> = sse_body(replay).collect().await;
        assert_eq!(body.last().map(|b| b.as_ref()), Some(DONE_FRAME.as_bytes()));

        let wire = futures::stream::iter(body.into_iter().map(Ok::<_, std::io::Error>));
        let decoded: Vec<UiChunk> = parse_ui_stream(wire)
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(decoded, events);
    }

    #[tokio::test]
    async fn cancelled_body_ends_with_error_frame() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let replay = replay_message(
            &fixtures::text_message("a1", &["x"]),
            TextGranularity::Whole,
            DelayPolicy::None,
            cancel,
        );
        let body: Vec<Bytes> = sse_body(replay).collect().await;
        assert_eq!(body.len(), 1);
        assert_eq!(
            body[0],
            Bytes::from("data: {\"type\":\"error\",\"errorText\":\"stream aborted\"}\n\n")
        );
    }

    #[tokio::test]
    async fn decoder_reports_bad_json() {
        let mut decoded = Box::pin(parse_ui_stream(bytes_stream(vec!["data: {nope\n\n"])));
        assert!(matches!(decoded.next().await, Some(Err(SseError::Json(_)))));
    }

    #[tokio::test]
    async fn decoder_stops_at_done() {
        let body = bytes_stream(vec![
            "data: {\"type\":\"start-step\"}\n\n",
            DONE_FRAME,
            "data: {\"type\":\"finish-step\"}\n\n",
        ]);
        let decoded: Vec<_> = parse_ui_stream(body).collect().await;
        assert_eq!(decoded.len(), 1);
        assert!(matches!(decoded[0], Ok(UiChunk::StartStep)));
    }
}
