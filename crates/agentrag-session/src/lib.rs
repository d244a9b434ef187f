//! AgentRAG Streaming Sessions
//!
//! This crate owns the lifecycle of one query-to-answer interaction:
//! - State accumulation over decoded agent events
//! - The single-flight session controller state machine
//! - Subscriber and transport seams for the view layer and the network
//! - Session metrics

pub mod controller;
pub mod metrics;
pub mod state;
pub mod subscriber;
pub mod transport;

pub use controller::{CONNECTION_LOST_MESSAGE, IDLE_TIMEOUT_MESSAGE, SessionController};
pub use metrics::SessionMetrics;
pub use state::{
    Applied, FailureKind, FinalAnswer, SessionFailure, SessionOutcome, SessionState,
    SessionStatus,
};
pub use subscriber::{ChannelSubscriber, SessionNotification, SessionSubscriber};
pub use transport::{MessageStream, StreamTransport};
