//! Decoding of single session-log lines.
//!
//! Each line is one JSON object. Known shapes:
//!
//! ```text
//! {"type":"session", "timestamp": ...}                                  header
//! {"type":"message", "timestamp": ..., "message": {role, content, usage?, model?}}
//! {"type":"model_change", "modelId": "..."}
//! {"type":"custom", "customType":"model-snapshot", "data": {"modelId": "..."}}
//! {"role": "...", "content": ..., "timestamp": ..., "model": ...}       flat message
//! ```
//!
//! Anything that is not a JSON object is dropped; unknown object shapes become
//! [`ParsedEvent::Other`] so that their timestamp still counts.

use crate::types::{deserialize_count, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// `customType` of snapshot records that carry the current model
pub const MODEL_SNAPSHOT: &str = "model-snapshot";

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    timestamp: Option<serde_json::Value>,

    // Wrapped message
    message: Option<RawMessage>,

    // model_change
    model_id: Option<String>,

    // custom
    custom_type: Option<String>,
    data: Option<RawCustomData>,

    // Flat message lines
    role: Option<String>,
    content: Option<RawContent>,
    model: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    content: Option<RawContent>,
    usage: Option<RawUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<RawBlock>),
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawBlock {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawUsage {
    #[serde(deserialize_with = "deserialize_count")]
    input: u64,
    #[serde(deserialize_with = "deserialize_count")]
    output: u64,
    #[serde(deserialize_with = "deserialize_count")]
    cache_read: u64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawCustomData {
    model_id: Option<String>,
}

// ============================================
// Parsed events
// ============================================

/// Author of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Other(String),
}

impl Role {
    fn from_raw(role: Option<&str>) -> Self {
        match role {
            Some("user") => Role::User,
            Some("assistant") => Role::Assistant,
            Some(other) if !other.is_empty() => Role::Other(other.to_string()),
            _ => Role::Other("unknown".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Other(s) => s,
        }
    }
}

/// One content block of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub kind: String,
    pub text: Option<String>,
}

/// Message content: a plain string or a list of typed blocks
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Content {
    #[default]
    Empty,
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    fn from_raw(raw: Option<RawContent>) -> Self {
        match raw {
            Some(RawContent::Text(s)) => Content::Text(s),
            Some(RawContent::Blocks(blocks)) => Content::Blocks(
                blocks
                    .into_iter()
                    .map(|b| ContentBlock {
                        kind: b.kind.unwrap_or_default(),
                        text: b.text,
                    })
                    .collect(),
            ),
            Some(RawContent::Other(_)) | None => Content::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }

    /// The string content, or the first `text` block
    pub fn first_text(&self) -> Option<&str> {
        match self {
            Content::Empty => None,
            Content::Text(s) => Some(s),
            Content::Blocks(blocks) => blocks
                .iter()
                .find(|b| b.kind == "text")
                .map(|b| b.text.as_deref().unwrap_or("")),
        }
    }

    /// The string content, or every block's text concatenated
    pub fn concatenated_text(&self) -> String {
        match self {
            Content::Empty => String::new(),
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| b.text.as_deref())
                .collect(),
        }
    }

    /// The string content, or the `text` blocks joined with newlines
    pub fn display_text(&self) -> String {
        match self {
            Content::Empty => String::new(),
            Content::Text(s) => s.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter(|b| b.kind == "text")
                .filter_map(|b| b.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Token usage reported on an assistant message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
}

/// Typed meaning of one log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedEvent {
    /// File header
    Session,
    Message {
        role: Role,
        content: Content,
        usage: Option<Usage>,
        model: Option<String>,
    },
    ModelChange {
        model_id: String,
    },
    CustomSnapshot {
        kind: String,
        model_id: Option<String>,
    },
    Other,
}

/// A decoded line: its event and optional timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub event: ParsedEvent,
}

/// Decode one line. Returns `None` for anything that is not a JSON object.
pub fn decode_line(line: &str) -> Option<LogRecord> {
    let raw: RawRecord = serde_json::from_str(line).ok()?;
    let timestamp = raw.timestamp.as_ref().and_then(parse_timestamp);

    let event = match raw.record_type.as_deref() {
        Some("session") => ParsedEvent::Session,
        Some("message") if raw.message.is_some() => message_event(raw.message),
        Some("model_change") => match raw.model_id {
            Some(model_id) => ParsedEvent::ModelChange { model_id },
            None => ParsedEvent::Other,
        },
        Some("custom") => ParsedEvent::CustomSnapshot {
            kind: raw.custom_type.unwrap_or_default(),
            model_id: raw.data.and_then(|d| d.model_id),
        },
        Some("message") | None if raw.role.is_some() => ParsedEvent::Message {
            role: Role::from_raw(raw.role.as_deref()),
            content: Content::from_raw(raw.content),
            usage: None,
            model: raw.model,
        },
        _ => ParsedEvent::Other,
    };

    Some(LogRecord { timestamp, event })
}

fn message_event(message: Option<RawMessage>) -> ParsedEvent {
    let message = message.unwrap_or_default();
    ParsedEvent::Message {
        role: Role::from_raw(message.role.as_deref()),
        content: Content::from_raw(message.content),
        usage: message.usage.map(|u| Usage {
            input: u.input,
            output: u.output,
            cache_read: u.cache_read,
        }),
        model: message.model,
    }
}

/// Whether a line is a `{"type":"session"}` header
pub fn is_header_line(line: &str) -> bool {
    matches!(
        decode_line(line),
        Some(LogRecord {
            event: ParsedEvent::Session,
            ..
        })
    )
}
