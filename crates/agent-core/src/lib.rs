//! # agent-core
//!
//! Wire-independent core of the streaming agent client: frame types, the
//! per-exchange event bus, and the state machine that assembles a chat reply.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────┐   ┌───────────────┐   ┌───────────────┐
//! │  Transport  │──►│ EventBus │──►│ ChatAssembler │──►│ ResultMatcher │
//! │  (runtime)  │   │ message  │   │ content       │   │ id, then name │
//! │             │   │ error    │   │ reasoning     │   │ fallback      │
//! │             │   │ close    │   │ tools         │   │               │
//! └─────────────┘   └──────────┘   └───────────────┘   └───────────────┘
//! ```
//!
//! Nothing here performs I/O; the transport lives in `agent-runtime`.

pub mod assembly;
pub mod bus;
pub mod error;
pub mod frame;
pub mod message;
pub mod session;
pub mod tool;

pub use assembly::{
    assemble, assemble_with, Assembly, ChatAssembler, ExchangeOutcome, FailedExchange,
    FinalizedMessage, InFlightMessage, Progress,
};
pub use bus::{EventBus, EventKind, ListenerId, StreamEvent};
pub use error::{AgentError, Result, TransportError};
pub use frame::{Frame, FrameKind, Payload};
pub use message::{AgentMessage, MessageTool, Role, RunAgentStreamRequest};
pub use session::SessionId;
pub use tool::{HeuristicMatcher, ResultMatcher, StrictIdMatcher, ToolInvocation, ToolInvocations};
