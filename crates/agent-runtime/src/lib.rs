//! # agent-runtime
//!
//! Streaming transport for agent exchanges.
//!
//! ## Modules
//!
//! - **config**: endpoint and grace-delay settings
//! - **sse**: chunk-boundary independent line decoding
//! - **transport**: the cancellable streaming request and its event bus
//! - **exchange**: drives a transport into a `ChatAssembler`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{run_exchange, StreamClient};
//!
//! let client = StreamClient::from_env()?;
//! let outcome = run_exchange(&client, request, |msg| print!("{}", msg.content)).await?;
//! ```

pub mod config;
pub mod exchange;
pub mod sse;
pub mod transport;

pub use config::StreamConfig;
pub use exchange::{run_exchange, run_exchange_with};
pub use transport::{StreamClient, StreamHandle};

// Re-export core types for convenience
pub use agent_core::{
    AgentError, AgentMessage, ChatAssembler, EventKind, ExchangeOutcome, FinalizedMessage,
    InFlightMessage, Result, RunAgentStreamRequest, SessionId, StreamEvent,
};
