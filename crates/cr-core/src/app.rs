//! Command implementations. Each writes its result to a caller-supplied
//! writer so the binary and the tests share one code path.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use cr_engine::template::{chunks_to_parts, message_to_markdown};
use cr_engine::{
    parse_markdown_with, sse_body, ChatTransport, DelayPolicy, MarkdownResolver, ParserOptions,
    SendRequest, TextGranularity,
};
use cr_protocol::UiMessage;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;

/// Read a source file, or stdin for `-`.
pub fn read_source(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))
    }
}

/// Print the parsed chunks as JSON lines.
pub fn run_parse<W: Write>(source: &str, options: &ParserOptions, out: &mut W) -> Result<()> {
    let chunks = parse_markdown_with(source, options)?;
    for chunk in &chunks {
        writeln!(out, "{}", serde_json::to_string(chunk)?)?;
    }
    debug!(chunks = chunks.len(), "parse done");
    Ok(())
}

/// Re-render a markdown source with canonical tool blocks.
pub fn run_template<W: Write>(source: &str, options: &ParserOptions, out: &mut W) -> Result<()> {
    let chunks = parse_markdown_with(source, options)?;
    let message = UiMessage::assistant("template", chunks_to_parts(&chunks));
    out.write_all(message_to_markdown(&message)?.as_bytes())?;
    Ok(())
}

pub fn run_filler<W: Write>(words: usize, seed: Option<u64>, out: &mut W) -> Result<()> {
    writeln!(out, "{}", cr_engine::filler::generate(words, seed))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ReplaySettings {
    pub session: String,
    pub delay: DelayPolicy,
    pub granularity: TextGranularity,
    pub options: ParserOptions,
}

impl ReplaySettings {
    /// Settings from the config file, with command-line overrides applied.
    pub fn from_config(config: &Config, delay_ms: Option<u64>, words: bool) -> Self {
        let delay = match delay_ms {
            Some(ms) => DelayPolicy::fixed(ms),
            None => config.replay.delay_policy(),
        };
        let granularity = if words {
            TextGranularity::Words
        } else {
            config.replay.text_granularity
        };
        Self {
            session: "default".to_string(),
            delay,
            granularity,
            options: config.parser.options(),
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    Finished,
    Cancelled,
}

/// Stream a markdown source as SSE frames.
pub async fn run_replay<W: Write>(
    source: String,
    settings: ReplaySettings,
    cancel: CancellationToken,
    out: &mut W,
) -> Result<ReplayOutcome> {
    let transport = ChatTransport::builder()
        .resolver(MarkdownResolver::new(source).with_options(settings.options))
        .delay(settings.delay)
        .granularity(settings.granularity)
        .build()?;

    let stream = transport
        .send_messages(SendRequest::submit(settings.session, Vec::new()), cancel.clone())
        .await?;

    let mut frames = Box::pin(sse_body(stream));
    let mut count = 0usize;
    while let Some(frame) = frames.next().await {
        out.write_all(&frame)?;
        out.flush()?;
        count += 1;
    }

    if cancel.is_cancelled() {
        info!(frames = count, "replay cancelled");
        Ok(ReplayOutcome::Cancelled)
    } else {
        debug!(frames = count, "replay finished");
        Ok(ReplayOutcome::Finished)
    }
}
