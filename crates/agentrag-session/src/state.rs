//! Session state and event accumulation
//!
//! A [`SessionState`] is created when a query is submitted and is only mutated
//! by folding decoded [`AgentEvent`]s into it. It collects what the terminal
//! event does not repeat: the sources from the last retrieval step and the
//! verifier's verdict.
//!
//! State transitions:
//! - Idle → Streaming: on submit
//! - Streaming → Completed: on a `complete` event
//! - Streaming → Failed: on an `error` event or a transport failure
//!
//! Completed and Failed are terminal; further events are ignored.

use agentrag_core::{AgentEvent, StepKind, VerificationResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Streaming,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// Where a session failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The pipeline emitted a terminal `error` event
    Pipeline,
    /// The connection failed or ended before a terminal event
    Transport,
}

/// Failure surfaced to the subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Final answer surfaced to the subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalAnswer {
    pub answer: String,
    /// Deduplicated sources from the last retrieval step
    pub sources: BTreeSet<String>,
    pub verification: Option<VerificationResult>,
    pub warning: Option<String>,
}

/// Terminal result of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed(FinalAnswer),
    Failed(SessionFailure),
}

/// What applying one event did to the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Session was not streaming; nothing changed
    Ignored,
    /// Non-terminal event, forward to the step callback
    Step,
    /// Session reached Completed
    Completed,
    /// Session reached Failed
    Failed,
}

/// State of one query-to-answer interaction
#[derive(Debug, Clone)]
pub struct SessionState {
    session_id: String,
    query: String,
    status: SessionStatus,
    collected_sources: BTreeSet<String>,
    verification: Option<VerificationResult>,
    outcome: Option<SessionOutcome>,
    skipped_events: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::idle()
    }
}

impl SessionState {
    /// Empty state with no session
    pub fn idle() -> Self {
        Self {
            session_id: String::new(),
            query: String::new(),
            status: SessionStatus::Idle,
            collected_sources: BTreeSet::new(),
            verification: None,
            outcome: None,
            skipped_events: 0,
        }
    }

    /// Fresh streaming state for a newly submitted query
    pub fn begin(query: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            query: query.into(),
            status: SessionStatus::Streaming,
            ..Self::idle()
        }
    }

    /// Fold a whole event sequence into a new session
    pub fn fold<'a>(
        query: impl Into<String>,
        events: impl IntoIterator<Item = &'a AgentEvent>,
    ) -> Self {
        let mut state = Self::begin(query);
        for event in events {
            state.apply(event);
        }
        state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn collected_sources(&self) -> &BTreeSet<String> {
        &self.collected_sources
    }

    pub fn verification(&self) -> Option<&VerificationResult> {
        self.verification.as_ref()
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn skipped_events(&self) -> u32 {
        self.skipped_events
    }

    /// Count a malformed message that was skipped
    pub fn record_skipped(&mut self) {
        if self.status == SessionStatus::Streaming {
            self.skipped_events += 1;
        }
    }

    /// Apply one decoded event
    pub fn apply(&mut self, event: &AgentEvent) -> Applied {
        if self.status != SessionStatus::Streaming {
            return Applied::Ignored;
        }

        match event {
            AgentEvent::Step {
                kind: StepKind::RetrievalAgent,
                data: Some(data),
                ..
            } => {
                self.collect_sources(data);
                Applied::Step
            }
            AgentEvent::Step {
                kind: StepKind::VerifierAgent,
                data: Some(data),
                ..
            } => {
                match serde_json::from_value::<VerificationResult>(data.clone()) {
                    Ok(verification) => self.verification = Some(verification),
                    Err(e) => debug!("Ignoring verifier payload with unexpected shape: {}", e),
                }
                Applied::Step
            }
            AgentEvent::Complete { final_response, .. } => {
                let verification = final_response
                    .verification
                    .clone()
                    .or_else(|| self.verification.clone());
                self.status = SessionStatus::Completed;
                self.outcome = Some(SessionOutcome::Completed(FinalAnswer {
                    answer: final_response.answer.clone(),
                    sources: self.collected_sources.clone(),
                    verification,
                    warning: final_response.warning.clone(),
                }));
                Applied::Completed
            }
            AgentEvent::Error { message } => {
                // Sources and verification stay in state but are never surfaced
                self.status = SessionStatus::Failed;
                self.outcome = Some(SessionOutcome::Failed(SessionFailure {
                    kind: FailureKind::Pipeline,
                    message: message.clone(),
                }));
                Applied::Failed
            }
            _ => Applied::Step,
        }
    }

    /// Fail a streaming session because the connection went away.
    ///
    /// Returns false if the session was not streaming.
    pub fn fail_transport(&mut self, message: impl Into<String>) -> bool {
        if self.status != SessionStatus::Streaming {
            return false;
        }
        self.status = SessionStatus::Failed;
        self.outcome = Some(SessionOutcome::Failed(SessionFailure {
            kind: FailureKind::Transport,
            message: message.into(),
        }));
        true
    }

    fn collect_sources(&mut self, data: &Value) {
        let Some(records) = data.as_array() else {
            debug!("Ignoring non-array retrieval payload");
            return;
        };

        self.collected_sources = records
            .iter()
            .filter_map(|record| record.get("source").and_then(Value::as_str))
            .filter(|source| !source.is_empty())
            .map(str::to_string)
            .collect();
    }
}
