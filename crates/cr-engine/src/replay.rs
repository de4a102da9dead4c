//! Paced, cancellable emission of an event sequence.
//!
//! Cancellation is checked before each emission and again after each
//! pause. Events already handed to the consumer stay delivered; a cancelled
//! stream always ends with `ReplayError::Aborted` instead of closing
//! silently.

use async_stream::stream;
use cr_protocol::{ContentChunk, UiChunk, UiMessage};
use futures::Stream;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::delay::DelayPolicy;
use crate::expand::chunks_to_events;
use crate::sequence::{message_to_events_with, TextGranularity};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("stream aborted")]
    Aborted,
}

/// Emit `events` in order, pausing before each one as `delay` resolves.
pub fn replay(
    events: Vec<UiChunk>,
    delay: DelayPolicy,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<UiChunk, ReplayError>> + Send + 'static {
    stream! {
        let total = events.len();
        for (index, event) in events.into_iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(emitted = index, total, "replay cancelled");
                yield Err(ReplayError::Aborted);
                return;
            }

            if let Some(pause) = delay.resolve(&event) {
                tokio::select! {
                    _ = sleep(pause) => {}
                    _ = cancel.cancelled() => {}
                }
                if cancel.is_cancelled() {
                    debug!(emitted = index, total, "replay cancelled during pause");
                    yield Err(ReplayError::Aborted);
                    return;
                }
            }

            yield Ok(event);
        }
        debug!(total, "replay finished");
    }
}

/// Replay a resolved message.
pub fn replay_message(
    message: &UiMessage,
    granularity: TextGranularity,
    delay: DelayPolicy,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<UiChunk, ReplayError>> + Send + 'static {
    replay(message_to_events_with(message, granularity), delay, cancel)
}

/// Replay parser output as one message.
pub fn replay_chunks(
    message_id: &str,
    chunks: &[ContentChunk],
    delay: DelayPolicy,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<UiChunk, ReplayError>> + Send + 'static {
    replay(chunks_to_events(message_id, chunks), delay, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::markdown::parse_markdown;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test]
    async fn replays_all_events_in_order() {
        let msg = fixtures::text_message("a1", &["one", "two"]);
        let expected = message_to_events_with(&msg, TextGranularity::Whole);
        let events: Vec<_> = replay_message(
            &msg,
            TextGranularity::Whole,
            DelayPolicy::None,
            CancellationToken::new(),
        )
        .collect()
        .await;

        let events: Vec<_> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(events, expected);
        assert!(matches!(events.last(), Some(UiChunk::Finish { .. })));
    }

    #[tokio::test]
    async fn cancel_before_start_yields_only_abort() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let msg = fixtures::text_message("a1", &["one"]);
        let events: Vec<_> =
            replay_message(&msg, TextGranularity::Whole, DelayPolicy::None, cancel)
                .collect()
                .await;
        assert_eq!(events, vec![Err(ReplayError::Aborted)]);
    }

    #[tokio::test]
    async fn cancel_after_second_event_truncates() {
        let msg = fixtures::text_message("a1", &["one", "two", "three"]);
        let cancel = CancellationToken::new();
        let mut stream = Box::pin(replay_message(
            &msg,
            TextGranularity::Whole,
            DelayPolicy::None,
            cancel.clone(),
        ));

        let mut received = Vec::new();
        let mut aborted = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    received.push(event);
                    if received.len() == 2 {
                        cancel.cancel();
                    }
                }
                Err(ReplayError::Aborted) => {
                    aborted = true;
                    break;
                }
            }
        }

        assert!(aborted);
        assert_eq!(received.len(), 2);
        assert!(!received.iter().any(|e| matches!(e, UiChunk::Finish { .. })));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_pause_aborts_promptly() {
        let msg = fixtures::text_message("a1", &["one"]);
        let cancel = CancellationToken::new();
        let mut stream = Box::pin(replay_message(
            &msg,
            TextGranularity::Whole,
            DelayPolicy::fixed(60_000),
            cancel.clone(),
        ));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        assert_eq!(stream.next().await, Some(Err(ReplayError::Aborted)));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn tool_latency_dominates_wall_time() {
        let src = "Five small text tokens here\n```tool search id=c1\noutput: {hits: 1}\n```";
        let chunks = parse_markdown(src).unwrap();
        let policy = DelayPolicy::dynamic(|chunk| {
            if chunk.is_tool_output() {
                Some(1000)
            } else {
                Some(20)
            }
        });

        let started = Instant::now();
        let events: Vec<_> = replay_chunks("m1", &chunks, policy, CancellationToken::new())
            .collect()
            .await;
        let elapsed = started.elapsed();

        let count = events.len() as u64;
        assert!(events.iter().all(Result::is_ok));
        assert!(elapsed >= Duration::from_millis(1000 + 20 * (count - 1)));
    }
}
