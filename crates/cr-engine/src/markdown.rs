//! Markdown to content-chunk parser.
//!
//! Prose is split into word and whitespace tokens. Tool calls are embedded
//! either as a fenced block or as a block-quote callout:
//!
//! ````text
//! ```tool search call_1
//! state: output-available
//! input:
//!   query: cats
//! ```
//!
//! > [!tool name=weather id=call_99]
//! > input:
//! >   location: Paris
//! ````
//!
//! Header tokens are `key=value` pairs or positional words (tool name first,
//! then call id). The body is a YAML mapping. A block whose body does not
//! decode is kept as prose.

use cr_protocol::{ContentChunk, ToolChunk, ToolState};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Tool name used when neither header nor body names the tool.
pub const DEFAULT_TOOL_NAME: &str = "tool";

const ID_KEYS: [&str; 5] = ["toolCallId", "tool_call_id", "callId", "id", "toolCall"];
const NAME_KEYS: [&str; 4] = ["toolName", "tool_name", "name", "tool"];
const ERROR_KEYS: [&str; 3] = ["errorText", "error_text", "error"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("source text is empty")]
    EmptySource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    /// Info-string keyword marking a tool fence or callout.
    pub keyword: String,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            keyword: DEFAULT_TOOL_NAME.to_string(),
        }
    }
}

impl ParserOptions {
    pub fn with_keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }
}

/// Per-document state threaded through one parse.
#[derive(Debug, Default)]
struct ParseContext {
    /// Embedded blocks seen so far, including ones that fail to decode.
    blocks: usize,
    chunks: Vec<ContentChunk>,
    prose: String,
}

impl ParseContext {
    fn next_fallback_id(&mut self) -> String {
        self.blocks += 1;
        format!("tool-call-{}", self.blocks)
    }

    fn flush_prose(&mut self) {
        if self.prose.is_empty() {
            return;
        }
        let prose = std::mem::take(&mut self.prose);
        self.chunks
            .extend(tokenize_text(&prose).into_iter().map(|value| ContentChunk::Text { value }));
    }

    fn push_tool(&mut self, tool: ToolChunk) {
        self.flush_prose();
        self.chunks.push(ContentChunk::Tool(tool));
    }
}

/// Parse with the default `tool` keyword.
pub fn parse_markdown(source: &str) -> Result<Vec<ContentChunk>, ParseError> {
    parse_markdown_with(source, &ParserOptions::default())
}

pub fn parse_markdown_with(
    source: &str,
    options: &ParserOptions,
) -> Result<Vec<ContentChunk>, ParseError> {
    if source.trim().is_empty() {
        return Err(ParseError::EmptySource);
    }

    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    let mut ctx = ParseContext::default();
    let mut i = 0;

    while i < lines.len() {
        if let Some(block) = fence_block(&lines, i, &options.keyword)
            .or_else(|| callout_block(&lines, i, &options.keyword))
        {
            i = block.next_line;
            handle_block(&mut ctx, block);
        } else {
            ctx.prose.push_str(lines[i]);
            i += 1;
        }
    }

    ctx.flush_prose();
    debug!(chunks = ctx.chunks.len(), blocks = ctx.blocks, "parsed markdown");
    Ok(ctx.chunks)
}

/// Split text into alternating word and whitespace-run tokens.
pub fn tokenize_text(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_space: Option<bool> = None;

    for c in text.chars() {
        let space = c.is_whitespace();
        if in_space.is_some_and(|s| s != space) {
            tokens.push(std::mem::take(&mut current));
        }
        in_space = Some(space);
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// An embedded block located in the source.
struct RawBlock {
    header: String,
    body: String,
    /// Original text of the block, restored as prose if decoding fails.
    raw: String,
    next_line: usize,
}

fn fence_block(lines: &[&str], start: usize, keyword: &str) -> Option<RawBlock> {
    let opening = lines[start].trim();
    let ticks = opening.chars().take_while(|&c| c == '`').count();
    if ticks < 3 {
        return None;
    }
    let header = header_after_keyword(&opening[ticks..], keyword)?;

    let close = lines[start + 1..].iter().position(|line| {
        let line = line.trim();
        line.len() >= ticks && line.chars().all(|c| c == '`')
    })? + start
        + 1;

    Some(RawBlock {
        header: header.to_string(),
        body: lines[start + 1..close].concat(),
        raw: lines[start..=close].concat(),
        next_line: close + 1,
    })
}

fn callout_block(lines: &[&str], start: usize, keyword: &str) -> Option<RawBlock> {
    let quoted = strip_quote(lines[start])?;
    let inner = quoted.trim().strip_prefix("[!")?;
    let inner = inner.trim_end().strip_suffix(']')?;
    let header = header_after_keyword(inner, keyword)?;

    let mut body = String::new();
    let mut end = start + 1;
    while end < lines.len() {
        match strip_quote(lines[end]) {
            Some(content) => {
                body.push_str(content);
                end += 1;
            }
            None => break,
        }
    }

    Some(RawBlock {
        header: header.to_string(),
        body,
        raw: lines[start..end].concat(),
        next_line: end,
    })
}

/// Strip a block-quote marker and one following space.
fn strip_quote(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('>')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Return the header tail if `text` starts with `keyword` as a whole word.
fn header_after_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.trim_start().strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

#[derive(Debug, Default, PartialEq)]
struct Header {
    name: Option<String>,
    id: Option<String>,
}

fn parse_header(tail: &str) -> Header {
    let mut header = Header::default();
    let mut positional = Vec::new();

    for token in tail.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) => {
                let value = unquote(value);
                if value.is_empty() {
                    continue;
                }
                match key.to_ascii_lowercase().as_str() {
                    "name" | "tool" | "toolname" => header.name = Some(value.to_string()),
                    "id" | "toolcallid" | "call" | "callid" => header.id = Some(value.to_string()),
                    _ => {}
                }
            }
            None => positional.push(unquote(token)),
        }
    }

    let mut positional = positional.into_iter().filter(|t| !t.is_empty());
    if header.name.is_none() {
        header.name = positional.next().map(str::to_string);
    }
    if header.id.is_none() {
        header.id = positional.next().map(str::to_string);
    }
    header
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
}

fn handle_block(ctx: &mut ParseContext, block: RawBlock) {
    let fallback_id = ctx.next_fallback_id();
    match decode_tool(&block, fallback_id) {
        Ok(tool) => ctx.push_tool(tool),
        Err(reason) => {
            warn!(%reason, "malformed tool block, keeping it as text");
            ctx.prose.push_str(&block.raw);
        }
    }
}

fn decode_tool(block: &RawBlock, fallback_id: String) -> Result<ToolChunk, String> {
    let body = decode_body(&block.body)?;
    let header = parse_header(&block.header);

    let tool_call_id = header
        .id
        .or_else(|| first_string(&body, &ID_KEYS))
        .unwrap_or(fallback_id);
    let tool_name = header
        .name
        .or_else(|| first_string(&body, &NAME_KEYS))
        .unwrap_or_else(|| DEFAULT_TOOL_NAME.to_string());

    let state = body
        .get("state")
        .and_then(Value::as_str)
        .and_then(|s| match s.parse::<ToolState>() {
            Ok(state) => Some(state),
            Err(e) => {
                debug!(%e, "ignoring tool state");
                None
            }
        });

    let error_text = ERROR_KEYS
        .iter()
        .find_map(|key| body.get(*key))
        .filter(|v| !v.is_null())
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

    Ok(ToolChunk {
        tool_call_id,
        tool_name,
        state,
        input: body.get("input").cloned(),
        output: body.get("output").cloned(),
        error_text,
    })
}

/// Decode a block body into a key-value map.
fn decode_body(body: &str) -> Result<serde_json::Map<String, Value>, String> {
    if body.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(body).map_err(|e| e.to_string())?;
    if yaml.is_null() {
        return Ok(serde_json::Map::new());
    }
    if !yaml.is_mapping() {
        return Err("block body is not a mapping".to_string());
    }
    match serde_json::to_value(&yaml).map_err(|e| e.to_string())? {
        Value::Object(map) => Ok(map),
        _ => Err("block body is not a mapping".to_string()),
    }
}

fn first_string(body: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match body.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
