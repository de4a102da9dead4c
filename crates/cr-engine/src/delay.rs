//! Pacing between emitted events.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cr_protocol::UiChunk;
use rand::Rng;

type DelayFn = dyn Fn(&UiChunk) -> Option<u64> + Send + Sync;

/// Resolves the pause, in milliseconds, that precedes an event.
#[derive(Clone, Default)]
pub enum DelayPolicy {
    #[default]
    None,
    Fixed(u64),
    Dynamic(Arc<DelayFn>),
}

impl fmt::Debug for DelayPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayPolicy::None => f.write_str("None"),
            DelayPolicy::Fixed(ms) => f.debug_tuple("Fixed").field(ms).finish(),
            DelayPolicy::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl DelayPolicy {
    pub fn fixed(ms: u64) -> Self {
        DelayPolicy::Fixed(ms)
    }

    pub fn dynamic(resolve: impl Fn(&UiChunk) -> Option<u64> + Send + Sync + 'static) -> Self {
        DelayPolicy::Dynamic(Arc::new(resolve))
    }

    /// Fixed `tool_ms` pause before tool outputs, random `min_ms..=max_ms`
    /// pause before everything else.
    pub fn simulated_latency(tool_ms: u64, min_ms: u64, max_ms: u64) -> Self {
        let (low, high) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        Self::dynamic(move |chunk| {
            if chunk.is_tool_output() {
                Some(tool_ms)
            } else {
                Some(rand::rng().random_range(low..=high))
            }
        })
    }

    /// The pause before `chunk`, if any.
    pub fn resolve(&self, chunk: &UiChunk) -> Option<Duration> {
        let ms = match self {
            DelayPolicy::None => None,
            DelayPolicy::Fixed(ms) => Some(*ms),
            DelayPolicy::Dynamic(resolve) => resolve(chunk),
        }?;
        (ms > 0).then(|| Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn delta() -> UiChunk {
        UiChunk::TextDelta {
            id: "t".to_string(),
            delta: "x".to_string(),
        }
    }

    fn output() -> UiChunk {
        UiChunk::ToolOutputAvailable {
            tool_call_id: "c".to_string(),
            output: Value::Null,
        }
    }

    #[test]
    fn none_and_zero_resolve_to_nothing() {
        assert_eq!(DelayPolicy::None.resolve(&delta()), None);
        assert_eq!(DelayPolicy::fixed(0).resolve(&delta()), None);
    }

    #[test]
    fn fixed_applies_to_everything() {
        let policy = DelayPolicy::fixed(15);
        assert_eq!(policy.resolve(&delta()), Some(Duration::from_millis(15)));
        assert_eq!(policy.resolve(&output()), Some(Duration::from_millis(15)));
    }

    #[test]
    fn dynamic_per_event_type() {
        let policy = DelayPolicy::dynamic(|chunk| match chunk {
            UiChunk::TextDelta { .. } => Some(5),
            _ => None,
        });
        assert_eq!(policy.resolve(&delta()), Some(Duration::from_millis(5)));
        assert_eq!(policy.resolve(&output()), None);
    }

    #[test]
    fn simulated_latency_ranges() {
        let policy = DelayPolicy::simulated_latency(1000, 60, 20);
        assert_eq!(policy.resolve(&output()), Some(Duration::from_millis(1000)));
        for _ in 0..50 {
            let pause = policy.resolve(&delta()).unwrap();
            assert!(pause >= Duration::from_millis(20) && pause <= Duration::from_millis(60));
        }
    }

    #[test]
    fn debug_hides_closure() {
        assert_eq!(format!("{:?}", DelayPolicy::dynamic(|_| None)), "Dynamic(..)");
        assert_eq!(format!("{:?}", DelayPolicy::fixed(3)), "Fixed(3)");
    }
}
