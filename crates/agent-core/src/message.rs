//! Conversation Messages
//!
//! Message shapes exchanged with the agent-serving backend: the user turn that
//! starts a streaming exchange and the history record of an assembled reply.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::assembly::FinalizedMessage;
use crate::session::SessionId;

/// Role of a message sender
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Plain text message type
pub const MESSAGE_TYPE_TEXT: i32 = 0;

/// A tool call as recorded in message history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTool {
    pub tool_id: String,
    pub name: String,
    pub arguments: String,
}

/// A single message in an agent session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub agent_id: i64,

    pub agent_session_id: String,

    pub message_agent_session_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_chat_id: Option<i64>,

    pub role: Role,

    #[serde(default)]
    pub message_type: i32,

    pub message_content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<MessageTool>>,
}

impl AgentMessage {
    /// Create a message for `agent_id` within `session`
    pub fn new(agent_id: i64, session: &SessionId, role: Role, content: impl Into<String>) -> Self {
        Self {
            agent_id,
            agent_session_id: session.to_string(),
            message_agent_session_id: session.to_string(),
            agent_chat_id: None,
            role,
            message_type: MESSAGE_TYPE_TEXT,
            message_content: content.into(),
            reasoning_content: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create a user turn
    pub fn user(agent_id: i64, session: &SessionId, content: impl Into<String>) -> Self {
        Self::new(agent_id, session, Role::User, content)
    }

    /// Record an assembled assistant reply in history form
    pub fn from_finalized(agent_id: i64, session: &SessionId, reply: &FinalizedMessage) -> Self {
        let mut msg = Self::new(agent_id, session, Role::Assistant, reply.content.clone());
        if !reply.reasoning.is_empty() {
            msg.reasoning_content = Some(reply.reasoning.clone());
        }
        if !reply.tools.is_empty() {
            msg.tool_calls = Some(
                reply
                    .tools
                    .iter()
                    .map(|call| MessageTool {
                        tool_id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    })
                    .collect(),
            );
        }
        msg
    }
}

/// Body of the streaming run request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunAgentStreamRequest {
    pub agent_id: i64,

    pub api_key: String,

    pub agent_message: AgentMessage,

    /// Placeholder substitutions applied to the agent's system prompt
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub prompt_replacement: HashMap<String, String>,
}

impl RunAgentStreamRequest {
    pub fn new(api_key: impl Into<String>, agent_message: AgentMessage) -> Self {
        Self {
            agent_id: agent_message.agent_id,
            api_key: api_key.into(),
            agent_message,
            prompt_replacement: HashMap::new(),
        }
    }

    pub fn with_replacement(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.prompt_replacement.insert(key.into(), value.into());
        self
    }
}
