//! Chat Assembly
//!
//! Folds the ordered frame sequence of one exchange into a single growing
//! assistant message and finalizes it on the terminal frame.
//!
//! ```text
//!  message_start ──► (begun)
//!  content / reasoning ──► append delta
//!  tool_call / tool_call_chunk ──► merge into ToolInvocations
//!  tool_result ──► ResultMatcher ──► set result
//!  message_end ──► Completed(FinalizedMessage)
//!  error ──► Failed(FailedExchange)
//! ```
//!
//! After a terminal frame every further frame is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;
use crate::frame::{first_str, Frame, FrameKind};
use crate::tool::{HeuristicMatcher, ResultMatcher, ToolInvocation, ToolInvocations};

/// The partially complete assistant response of an open exchange
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightMessage {
    pub content: String,
    pub reasoning: String,
    pub tools: ToolInvocations,
}

/// Immutable snapshot taken when the exchange ended successfully
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedMessage {
    pub content: String,
    pub reasoning: String,
    pub tools: ToolInvocations,
    pub finished_at: DateTime<Utc>,
}

impl FinalizedMessage {
    fn seal(message: InFlightMessage) -> Self {
        Self {
            content: message.content,
            reasoning: message.reasoning,
            tools: message.tools,
            finished_at: Utc::now(),
        }
    }

    pub fn tool(&self, id: &str) -> Option<&ToolInvocation> {
        self.tools.get(id)
    }
}

/// An exchange that ended in failure
#[derive(Debug)]
pub struct FailedExchange {
    pub error: AgentError,

    /// Whatever had been assembled before the failure
    pub partial: Option<InFlightMessage>,
}

impl FailedExchange {
    /// Failure text for display
    pub fn message(&self) -> String {
        match &self.error {
            AgentError::Upstream(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Result of feeding one frame to the assembler
#[derive(Debug)]
pub enum Progress {
    /// The in-flight message changed; carries a snapshot of it
    Updated(InFlightMessage),

    /// Frame accepted without changing the message
    Unchanged,

    /// `message_end` arrived
    Completed(FinalizedMessage),

    /// `error` arrived, or a payload could not be decoded
    Failed(FailedExchange),

    /// The exchange had already ended
    Ignored,
}

impl Progress {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

/// How an exchange ended
#[derive(Debug)]
pub enum ExchangeOutcome {
    Completed(FinalizedMessage),
    Failed(FailedExchange),

    /// The frames ran out before a terminal frame; carries the last state
    Incomplete(Option<InFlightMessage>),
}

impl ExchangeOutcome {
    pub fn into_completed(self) -> Option<FinalizedMessage> {
        match self {
            Self::Completed(message) => Some(message),
            _ => None,
        }
    }

    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Begun,
    Finished,
}

/// Frame-driven state machine for one exchange
#[derive(Debug)]
pub struct ChatAssembler<M = HeuristicMatcher> {
    phase: Phase,
    message: Option<InFlightMessage>,
    matcher: M,
}

impl Default for ChatAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatAssembler {
    pub fn new() -> Self {
        Self::with_matcher(HeuristicMatcher)
    }
}

impl<M: ResultMatcher> ChatAssembler<M> {
    /// Use a different tool-result matching policy
    pub const fn with_matcher(matcher: M) -> Self {
        Self {
            phase: Phase::Idle,
            message: None,
            matcher,
        }
    }

    /// The message assembled so far, if any frame has opened one
    pub const fn current(&self) -> Option<&InFlightMessage> {
        self.message.as_ref()
    }

    /// Whether `message_start` has been seen
    pub fn has_begun(&self) -> bool {
        self.phase != Phase::Idle
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Apply one frame
    pub fn apply(&mut self, frame: &Frame) -> Progress {
        if self.is_finished() {
            tracing::debug!(kind = %frame.kind, "Frame after end of exchange ignored");
            return Progress::Ignored;
        }

        match self.step(frame) {
            Ok(progress) => progress,
            Err(error) => self.fail(error),
        }
    }

    fn step(&mut self, frame: &Frame) -> crate::Result<Progress> {
        match &frame.kind {
            FrameKind::MessageStart => {
                tracing::debug!("Exchange started");
                self.phase = Phase::Begun;
                Ok(Progress::Unchanged)
            }
            FrameKind::Content => {
                let data = frame.decode_data()?;
                self.open().content.push_str(delta(&data));
                Ok(self.updated())
            }
            FrameKind::Reasoning => {
                let data = frame.decode_data()?;
                self.open().reasoning.push_str(delta(&data));
                Ok(self.updated())
            }
            FrameKind::ToolCall | FrameKind::ToolCallChunk => {
                let data = frame.decode_data()?;
                let id = data.get("tool_id").and_then(Value::as_str).unwrap_or_default();
                let name = first_str(&data, &["name", "tool_name"]);
                let arguments = first_str(&data, &["arguments", "args_chunk"]).unwrap_or_default();

                self.open().tools.merge_fragment(id, name, arguments);
                Ok(self.updated())
            }
            FrameKind::ToolResult => {
                let data = frame.decode_data()?;
                Ok(self.apply_result(&data))
            }
            FrameKind::MessageEnd => {
                self.phase = Phase::Finished;
                let message = FinalizedMessage::seal(self.message.take().unwrap_or_default());
                tracing::debug!(
                    content_len = message.content.len(),
                    tools = message.tools.len(),
                    "Exchange completed"
                );
                Ok(Progress::Completed(message))
            }
            FrameKind::Error => {
                let data = frame.decode_data()?;
                let text = first_str(&data, &["message"]).unwrap_or("unknown error");
                Ok(self.fail(AgentError::Upstream(text.to_string())))
            }
            FrameKind::Other(tag) => {
                tracing::debug!(kind = %tag, "Unknown frame type ignored");
                Ok(Progress::Unchanged)
            }
        }
    }

    fn apply_result(&mut self, data: &Value) -> Progress {
        let id = first_str(data, &["tool_id", "id", "tool_call_id"]);
        let name = first_str(data, &["tool_name", "name"]);
        let result = match data.get("result") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        let message = self.message.get_or_insert_with(InFlightMessage::default);
        match self.matcher.select(message.tools.as_slice(), id, name) {
            Some(idx) => {
                message.tools.set_result(idx, result);
                Progress::Updated(message.clone())
            }
            None => {
                tracing::warn!(
                    tool_id = ?id,
                    tool_name = ?name,
                    "Tool result matched no invocation, dropped"
                );
                Progress::Unchanged
            }
        }
    }

    fn open(&mut self) -> &mut InFlightMessage {
        self.message.get_or_insert_with(InFlightMessage::default)
    }

    fn updated(&self) -> Progress {
        Progress::Updated(self.message.clone().unwrap_or_default())
    }

    fn fail(&mut self, error: AgentError) -> Progress {
        tracing::debug!(error = %error, "Exchange failed");
        self.phase = Phase::Finished;
        Progress::Failed(FailedExchange {
            error,
            partial: self.message.take(),
        })
    }
}

fn delta(data: &Value) -> &str {
    data.get("content").and_then(Value::as_str).unwrap_or_default()
}

/// Snapshots and outcome of folding a whole frame sequence
#[derive(Debug)]
pub struct Assembly {
    /// The in-flight message after every frame that changed it
    pub snapshots: Vec<InFlightMessage>,
    pub outcome: ExchangeOutcome,
}

/// Fold `frames` with the default matcher
pub fn assemble<I>(frames: I) -> Assembly
where
    I: IntoIterator<Item = Frame>,
{
    assemble_with(ChatAssembler::new(), frames)
}

/// Fold `frames` through a prepared assembler
pub fn assemble_with<M, I>(mut assembler: ChatAssembler<M>, frames: I) -> Assembly
where
    M: ResultMatcher,
    I: IntoIterator<Item = Frame>,
{
    let mut snapshots = Vec::new();
    for frame in frames {
        match assembler.apply(&frame) {
            Progress::Updated(snapshot) => snapshots.push(snapshot),
            Progress::Completed(message) => {
                return Assembly {
                    snapshots,
                    outcome: ExchangeOutcome::Completed(message),
                };
            }
            Progress::Failed(failure) => {
                return Assembly {
                    snapshots,
                    outcome: ExchangeOutcome::Failed(failure),
                };
            }
            Progress::Unchanged | Progress::Ignored => {}
        }
    }

    let last = snapshots.last().cloned();
    Assembly {
        snapshots,
        outcome: ExchangeOutcome::Incomplete(last),
    }
}
