//! Agent progress events
//!
//! The pipeline streams one JSON object per message, discriminated by its
//! `step` field. Intermediate steps carry a progress note and an optional
//! step-specific payload; `complete` and `error` end the session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Intermediate pipeline stages known to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Router,
    QueryAgent,
    RetrievalAgent,
    SynthesisAgent,
    VerifierAgent,
}

impl StepKind {
    /// Wire name of the step
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Router => "router",
            StepKind::QueryAgent => "query_agent",
            StepKind::RetrievalAgent => "retrieval_agent",
            StepKind::SynthesisAgent => "synthesis_agent",
            StepKind::VerifierAgent => "verifier_agent",
        }
    }

    /// Parse a wire step name, returning None for terminal or unknown steps
    pub fn from_wire(step: &str) -> Option<Self> {
        match step {
            "router" => Some(StepKind::Router),
            "query_agent" => Some(StepKind::QueryAgent),
            "retrieval_agent" => Some(StepKind::RetrievalAgent),
            "synthesis_agent" => Some(StepKind::SynthesisAgent),
            "verifier_agent" => Some(StepKind::VerifierAgent),
            _ => None,
        }
    }

    /// Human-readable agent name
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Router => "Router",
            StepKind::QueryAgent => "Query Agent",
            StepKind::RetrievalAgent => "Retrieval Agent",
            StepKind::SynthesisAgent => "Synthesis Agent",
            StepKind::VerifierAgent => "Verifier Agent",
        }
    }
}

/// Verdict produced by the verifier agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_valid: bool,

    #[serde(default)]
    pub reasoning: String,
}

/// Payload of the terminal `complete` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    /// Generated answer text
    pub answer: String,

    /// Verification attached by the pipeline (takes precedence over the
    /// verdict accumulated from `verifier_agent` events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationResult>,

    /// Set by the pipeline when the answer could not be verified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// One decoded stream message
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Session begins
    Start { message: Option<String> },

    /// Intermediate pipeline step
    Step {
        kind: StepKind,
        message: String,
        data: Option<Value>,
    },

    /// Terminal success
    Complete {
        message: Option<String>,
        final_response: FinalResponse,
    },

    /// Terminal failure reported by the pipeline
    Error { message: String },

    /// Step the client does not know about yet
    Other {
        step: String,
        message: Option<String>,
        data: Option<Value>,
    },
}

impl AgentEvent {
    /// Wire name of the event's step
    pub fn step(&self) -> &str {
        match self {
            AgentEvent::Start { .. } => "start",
            AgentEvent::Step { kind, .. } => kind.as_str(),
            AgentEvent::Complete { .. } => "complete",
            AgentEvent::Error { .. } => "error",
            AgentEvent::Other { step, .. } => step,
        }
    }

    /// Whether this event ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Complete { .. } | AgentEvent::Error { .. })
    }

    /// Progress note, if the event carries one
    pub fn message(&self) -> Option<&str> {
        match self {
            AgentEvent::Start { message }
            | AgentEvent::Complete { message, .. }
            | AgentEvent::Other { message, .. } => message.as_deref(),
            AgentEvent::Step { message, .. } | AgentEvent::Error { message } => Some(message),
        }
    }

    /// Step-specific payload, if any
    pub fn data(&self) -> Option<&Value> {
        match self {
            AgentEvent::Step { data, .. } | AgentEvent::Other { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    /// Display name for the step
    pub fn label(&self) -> String {
        match self {
            AgentEvent::Start { .. } => "Start".to_string(),
            AgentEvent::Step { kind, .. } => kind.label().to_string(),
            AgentEvent::Complete { .. } => "Complete".to_string(),
            AgentEvent::Error { .. } => "Error".to_string(),
            AgentEvent::Other { step, .. } => step.replace('_', " "),
        }
    }
}
