//! Stream Frames
//!
//! A frame is one logical unit of the streaming wire protocol: a type tag plus
//! an opaque JSON-encoded `data` string that the assembler decodes per type.
//!
//! ```text
//! data: {"type":"content","data":"{\"content\":\"Hel\"}"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, Result};

/// Frame type tags emitted by the agent-serving backend
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    MessageStart,
    Content,
    Reasoning,
    ToolCall,
    ToolCallChunk,
    ToolResult,
    MessageEnd,
    Error,
    /// Any tag this client does not know about
    Other(String),
}

impl FrameKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::MessageStart => "message_start",
            Self::Content => "content",
            Self::Reasoning => "reasoning",
            Self::ToolCall => "tool_call",
            Self::ToolCallChunk => "tool_call_chunk",
            Self::ToolResult => "tool_result",
            Self::MessageEnd => "message_end",
            Self::Error => "error",
            Self::Other(tag) => tag,
        }
    }

    /// `message_end` and `error` end an exchange
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::MessageEnd | Self::Error)
    }
}

impl From<&str> for FrameKind {
    fn from(tag: &str) -> Self {
        match tag {
            "message_start" => Self::MessageStart,
            "content" => Self::Content,
            "reasoning" => Self::Reasoning,
            "tool_call" => Self::ToolCall,
            "tool_call_chunk" => Self::ToolCallChunk,
            "tool_result" => Self::ToolResult,
            "message_end" => Self::MessageEnd,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire envelope carried on every `data:` line
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,

    #[serde(default)]
    data: Option<String>,
}

/// A decoded frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,

    /// Serialized payload object; `"{}"` when the wire omitted it
    pub data: String,
}

impl Frame {
    pub fn new(kind: FrameKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// Read a frame from the envelope object `{"type": .., "data": ..}`
    pub fn from_value(value: &Value) -> Result<Self> {
        let envelope: Envelope = serde_json::from_value(value.clone())?;
        Ok(Self {
            kind: FrameKind::from(envelope.kind.as_str()),
            data: envelope.data.unwrap_or_else(|| "{}".into()),
        })
    }

    /// Read a frame from a message payload, whichever form it arrived in
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        match payload {
            Payload::Json(value) => Self::from_value(value),
            Payload::Raw(text) => {
                let value: Value = serde_json::from_str(text)
                    .map_err(|e| AgentError::Decode(format!("unparseable frame {text:?}: {e}")))?;
                Self::from_value(&value)
            }
        }
    }

    /// Decode the inner `data` object
    pub fn decode_data(&self) -> Result<Value> {
        serde_json::from_str(&self.data)
            .map_err(|e| AgentError::Decode(format!("{} frame: {e}", self.kind)))
    }
}

/// Body of a `"message"` event as the transport hands it out
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// The data line parsed as JSON
    Json(Value),

    /// The trimmed data line could not be parsed and is delivered as-is
    Raw(String),
}

impl Payload {
    /// Parse a trimmed data-line body, degrading to `Raw` on failure
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Self::Json(value),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    line = text,
                    "Unparseable stream data, delivering raw text"
                );
                Self::Raw(text.to_string())
            }
        }
    }

    /// The `type` tag, if this payload is a JSON envelope carrying one
    pub fn frame_type(&self) -> Option<&str> {
        match self {
            Self::Json(value) => value.get("type").and_then(Value::as_str),
            Self::Raw(_) => None,
        }
    }
}

/// First non-empty string among `keys`, mirroring JavaScript `a || b` lookups
pub(crate) fn first_str<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| data.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}
