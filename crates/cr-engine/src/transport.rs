//! Request handling in front of the replay engine.
//!
//! A `ChatTransport` asks a `MessageResolver` for the conversation after a
//! turn, checks that exactly one new assistant message came back, remembers
//! it per session for reconnects, and hands back a paced event stream.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use cr_protocol::{Interaction, Role, UiChunk, UiMessage};
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::delay::DelayPolicy;
use crate::filler;
use crate::markdown::{parse_markdown_with, ParseError, ParserOptions};
use crate::replay::{replay_message, ReplayError};
use crate::sequence::TextGranularity;
use crate::template::interaction_to_message;

pub type ReplayStream = Pin<Box<dyn Stream<Item = Result<UiChunk, ReplayError>> + Send>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no message resolver configured")]
    MissingResolver,
    #[error("expected exactly one new assistant message, resolver produced {found}")]
    AssistantMessageCount { found: usize },
    #[error("regenerate request without a message id")]
    MissingRegenerateTarget,
    #[error("regenerate target `{0}` not found")]
    RegenerateTargetNotFound(String),
    #[error("regenerate target `{0}` is not an assistant message")]
    RegenerateTargetNotAssistant(String),
    #[error("resolver failed: {0}")]
    Resolver(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    SubmitMessage,
    RegenerateMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub session_key: String,
    pub trigger: Trigger,
    pub messages: Vec<UiMessage>,
    /// Assistant message to replace on regenerate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl SendRequest {
    pub fn submit(session_key: impl Into<String>, messages: Vec<UiMessage>) -> Self {
        Self {
            session_key: session_key.into(),
            trigger: Trigger::SubmitMessage,
            messages,
            message_id: None,
        }
    }

    pub fn regenerate(
        session_key: impl Into<String>,
        messages: Vec<UiMessage>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            session_key: session_key.into(),
            trigger: Trigger::RegenerateMessage,
            messages,
            message_id: Some(message_id.into()),
        }
    }

    /// Prior messages the new turn is appended to. On regenerate the target,
    /// which must be an assistant message, and everything after it are
    /// dropped.
    pub fn baseline(&self) -> Result<&[UiMessage], TransportError> {
        match self.trigger {
            Trigger::SubmitMessage => Ok(&self.messages),
            Trigger::RegenerateMessage => {
                let target = self
                    .message_id
                    .as_deref()
                    .ok_or(TransportError::MissingRegenerateTarget)?;
                let index = self
                    .messages
                    .iter()
                    .position(|m| m.id == target)
                    .ok_or_else(|| TransportError::RegenerateTargetNotFound(target.to_string()))?;
                if self.messages[index].role != Role::Assistant {
                    return Err(TransportError::RegenerateTargetNotAssistant(
                        target.to_string(),
                    ));
                }
                Ok(&self.messages[..index])
            }
        }
    }
}

/// Source of the conversation state after a turn.
#[async_trait]
pub trait MessageResolver: Send + Sync {
    /// The full message list after this turn: the request's baseline plus
    /// the new assistant message.
    async fn resolve(&self, request: &SendRequest) -> Result<Vec<UiMessage>, TransportError>;
}

/// Appends a fixed set of replies to the baseline.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    replies: Vec<UiMessage>,
}

impl StaticResolver {
    pub fn new(replies: Vec<UiMessage>) -> Self {
        Self { replies }
    }

    pub fn reply(message: UiMessage) -> Self {
        Self::new(vec![message])
    }
}

#[async_trait]
impl MessageResolver for StaticResolver {
    async fn resolve(&self, request: &SendRequest) -> Result<Vec<UiMessage>, TransportError> {
        let mut messages = request.baseline()?.to_vec();
        messages.extend(self.replies.iter().cloned());
        Ok(messages)
    }
}

/// Builds the reply from a stored interaction, parsing its output markdown
/// when it carries no structured tool calls.
#[derive(Debug, Clone)]
pub struct MarkdownResolver {
    interaction: Interaction,
    options: ParserOptions,
}

impl MarkdownResolver {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self::from_interaction(Interaction::new(markdown))
    }

    pub fn from_interaction(interaction: Interaction) -> Self {
        Self {
            interaction,
            options: ParserOptions::default(),
        }
    }

    /// Reply with generated filler text.
    pub fn filler(words: usize, seed: Option<u64>) -> Self {
        Self::new(filler::generate(words, seed))
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl MessageResolver for MarkdownResolver {
    async fn resolve(&self, request: &SendRequest) -> Result<Vec<UiMessage>, TransportError> {
        let baseline = request.baseline()?;
        let id = match request.trigger {
            Trigger::RegenerateMessage => request.message_id.clone(),
            Trigger::SubmitMessage => None,
        }
        .unwrap_or_else(|| next_message_id(baseline));

        let chunks = if self.interaction.tool_calls.is_empty() {
            parse_markdown_with(&self.interaction.output, &self.options)?
        } else {
            Vec::new()
        };

        let mut messages = baseline.to_vec();
        messages.push(interaction_to_message(&id, &self.interaction, &chunks));
        Ok(messages)
    }
}

fn next_message_id(existing: &[UiMessage]) -> String {
    let mut n = existing.len() + 1;
    loop {
        let id = format!("msg-{n}");
        if !existing.iter().any(|m| m.id == id) {
            return id;
        }
        n += 1;
    }
}

#[derive(Default)]
pub struct ChatTransportBuilder {
    resolver: Option<Arc<dyn MessageResolver>>,
    delay: DelayPolicy,
    granularity: TextGranularity,
}

impl ChatTransportBuilder {
    pub fn resolver(mut self, resolver: impl MessageResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn delay(mut self, delay: DelayPolicy) -> Self {
        self.delay = delay;
        self
    }

    pub fn granularity(mut self, granularity: TextGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn build(self) -> Result<ChatTransport, TransportError> {
        Ok(ChatTransport {
            resolver: self.resolver.ok_or(TransportError::MissingResolver)?,
            delay: self.delay,
            granularity: self.granularity,
            sessions: Mutex::new(HashMap::new()),
        })
    }
}

pub struct ChatTransport {
    resolver: Arc<dyn MessageResolver>,
    delay: DelayPolicy,
    granularity: TextGranularity,
    sessions: Mutex<HashMap<String, UiMessage>>,
}

impl ChatTransport {
    pub fn builder() -> ChatTransportBuilder {
        ChatTransportBuilder::default()
    }

    /// Resolve the turn and stream the new assistant message.
    ///
    /// All request and resolver problems are reported here, before any
    /// event is produced.
    pub async fn send_messages(
        &self,
        request: SendRequest,
        cancel: CancellationToken,
    ) -> Result<ReplayStream, TransportError> {
        let baseline = request.baseline()?;
        let resolved = self.resolver.resolve(&request).await?;

        let mut appended = resolved
            .into_iter()
            .filter(|m| m.role == Role::Assistant && !baseline.iter().any(|b| b.id == m.id));
        let message = match (appended.next(), appended.next()) {
            (Some(message), None) => message,
            (None, _) => return Err(TransportError::AssistantMessageCount { found: 0 }),
            (Some(_), Some(_)) => {
                return Err(TransportError::AssistantMessageCount {
                    found: 2 + appended.count(),
                })
            }
        };

        info!(
            session = %request.session_key,
            trigger = ?request.trigger,
            message_id = %message.id,
            parts = message.parts.len(),
            "streaming assistant message"
        );
        let stream = replay_message(&message, self.granularity, self.delay.clone(), cancel);
        self.lock_sessions()
            .insert(request.session_key, message);
        Ok(Box::pin(stream))
    }

    /// Replay the last message streamed for `session_key` from the start.
    pub fn reconnect(&self, session_key: &str, cancel: CancellationToken) -> Option<ReplayStream> {
        let message = self.last_message(session_key);
        debug!(session = session_key, found = message.is_some(), "reconnect");
        let message = message?;
        Some(Box::pin(replay_message(
            &message,
            self.granularity,
            self.delay.clone(),
            cancel,
        )))
    }

    pub fn last_message(&self, session_key: &str) -> Option<UiMessage> {
        self.lock_sessions().get(session_key).cloned()
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, UiMessage>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
