//! Error Types

use thiserror::Error;

/// Result type alias for streaming exchange operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Network-level failure of a streaming request.
///
/// Cloneable so it can be handed to every error listener of an exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection or read failure that was not caused by a caller cancel
    #[error("Transport error: {0}")]
    Connection(String),

    /// The backend answered with a non-success status
    #[error("Request failed with status: {status}")]
    Status { status: u16, body: String },
}

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// The streaming request failed at the network level
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The backend reported a logical error through an `error` frame
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if a caller-side retry is reasonable.
    ///
    /// Nothing in this workspace retries on its own; this only informs the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(TransportError::Connection(_)) | Self::Io(_) => true,
            Self::Transport(TransportError::Status { status, .. }) => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(TransportError::Connection(_)) => {
                "The agent service could not be reached. Please try again.".into()
            }
            Self::Transport(TransportError::Status { status: 401 | 403, .. }) => {
                "Authentication failed. Please check the agent API key.".into()
            }
            Self::Transport(TransportError::Status { status, .. }) => {
                format!("The agent service rejected the request ({status}).")
            }
            Self::Decode(msg) => format!("Failed to read the agent response: {msg}"),
            Self::Upstream(msg) => format!("Error: {msg}"),
            Self::Config(msg) => format!("Invalid configuration: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}
