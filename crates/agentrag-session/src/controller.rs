//! Session controller
//!
//! Orchestrates one query at a time: guards against concurrent sessions,
//! opens and releases the stream, feeds decoded events to the accumulator and
//! notifies the subscriber.
//!
//! The controller is driven by its owner. Either call [`SessionController::next`]
//! / [`SessionController::run`] to pull messages from the transport's stream, or
//! push raw messages in with [`SessionController::handle_message`] when the
//! stream is consumed elsewhere.

use crate::{
    metrics::SessionMetrics,
    state::{Applied, FailureKind, SessionOutcome, SessionState, SessionStatus},
    subscriber::SessionSubscriber,
    transport::{MessageStream, StreamTransport},
};
use agentrag_core::{Error, Result, decode_event};
use futures::StreamExt;
use std::time::{Duration, Instant};
use tracing::{Instrument, Span, debug, info, info_span, warn};

/// Failure text surfaced when the connection drops before a terminal event
pub const CONNECTION_LOST_MESSAGE: &str = "Connection lost. Please try again.";

/// Failure text surfaced when the stream goes quiet for too long
pub const IDLE_TIMEOUT_MESSAGE: &str = "Stream idle timeout. Please try again.";

pub struct SessionController<T, S> {
    transport: T,
    subscriber: S,
    state: SessionState,
    /// Open stream resource; `Some` only while streaming
    stream: Option<MessageStream>,
    idle_timeout: Option<Duration>,
    metrics: Option<SessionMetrics>,
    started_at: Option<Instant>,
    span: Span,
}

impl<T, S> SessionController<T, S>
where
    T: StreamTransport,
    S: SessionSubscriber,
{
    /// Create an idle controller
    pub fn new(transport: T, subscriber: S) -> Self {
        Self {
            transport,
            subscriber,
            state: SessionState::idle(),
            stream: None,
            idle_timeout: None,
            metrics: None,
            started_at: None,
            span: Span::none(),
        }
    }

    /// Fail the session when no message arrives within `timeout`
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Record session metrics
    pub fn with_metrics(mut self, metrics: SessionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    /// Whether a stream resource is currently held
    pub fn has_open_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn subscriber(&self) -> &S {
        &self.subscriber
    }

    pub fn subscriber_mut(&mut self) -> &mut S {
        &mut self.subscriber
    }

    /// Start a new session for `query`.
    ///
    /// Fails with [`Error::SessionBusy`] while a session is streaming, leaving
    /// it untouched. A stream that cannot be opened fails the new session
    /// through the transport-failure path rather than returning an error.
    pub async fn submit(&mut self, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidQuery("query must not be empty".to_string()));
        }

        if self.state.status() == SessionStatus::Streaming {
            if let Some(metrics) = &self.metrics {
                metrics.busy_rejections.inc();
            }
            debug!("Rejecting submit: session {} is streaming", self.state.session_id());
            return Err(Error::SessionBusy);
        }

        // Terminal sessions have already released their stream
        self.close_stream();
        self.state = SessionState::begin(query);
        self.started_at = Some(Instant::now());
        self.span = info_span!(
            "session",
            session_id = %self.state.session_id(),
            query = %query
        );

        let opened = self
            .transport
            .open(query)
            .instrument(self.span.clone())
            .await;

        let span = self.span.clone();
        let _enter = span.enter();
        match opened {
            Ok(stream) => {
                info!("Session started");
                if let Some(metrics) = &self.metrics {
                    metrics.sessions_started.inc();
                }
                self.stream = Some(stream);
            }
            Err(e) => {
                warn!("Failed to open event stream: {}", e);
                self.fail_transport(CONNECTION_LOST_MESSAGE);
            }
        }

        Ok(())
    }

    /// Process one raw inbound message
    pub fn handle_message(&mut self, raw: &str) {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.state.status() != SessionStatus::Streaming {
            debug!("Dropping message received outside of a streaming session");
            return;
        }

        let event = match decode_event(raw) {
            Ok(event) => event,
            Err(e) => {
                self.skip_malformed(&e);
                return;
            }
        };

        debug!(step = %event.step(), "Received event");
        if let Some(metrics) = &self.metrics {
            metrics.record_event(event.step());
        }

        match self.state.apply(&event) {
            Applied::Ignored => {}
            Applied::Step => self.subscriber.on_step(&event),
            Applied::Completed | Applied::Failed => self.finish(),
        }
    }

    /// Fail the streaming session because the transport reported an error
    pub fn handle_transport_error(&mut self, reason: &str) {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.state.status() != SessionStatus::Streaming {
            debug!("Ignoring transport error outside of a streaming session: {}", reason);
            return;
        }

        warn!("Transport failure: {}", reason);
        self.fail_transport(CONNECTION_LOST_MESSAGE);
    }

    /// Wait for the next message on the open stream and dispatch it.
    ///
    /// Returns the status after dispatch, or `None` if no stream is open.
    pub async fn next(&mut self) -> Option<SessionStatus> {
        let stream = self.stream.as_mut()?;

        let item = match self.idle_timeout {
            Some(window) => match tokio::time::timeout(window, stream.next()).await {
                Ok(item) => item,
                Err(_) => {
                    let span = self.span.clone();
                    let _enter = span.enter();
                    warn!("No event received for {:?}", window);
                    self.fail_transport(IDLE_TIMEOUT_MESSAGE);
                    return Some(self.status());
                }
            },
            None => stream.next().await,
        };

        match item {
            Some(Ok(raw)) => self.handle_message(&raw),
            Some(Err(e @ Error::MalformedEvent(_))) => {
                let span = self.span.clone();
                let _enter = span.enter();
                self.skip_malformed(&e);
            }
            Some(Err(e)) => self.handle_transport_error(&e.to_string()),
            None => self.handle_transport_error("stream ended before a terminal event"),
        }

        Some(self.status())
    }

    /// Drive the open stream until the session ends
    pub async fn run(&mut self) -> SessionStatus {
        while let Some(status) = self.next().await {
            if status.is_terminal() {
                return status;
            }
        }
        self.status()
    }

    /// Abandon any session and return to idle.
    ///
    /// An active stream is closed without notifying the subscriber.
    pub fn reset(&mut self) {
        if self.state.status() == SessionStatus::Streaming {
            let span = self.span.clone();
            let _enter = span.enter();
            info!("Session abandoned by reset");
            self.record_finished("reset");
        }

        self.close_stream();
        self.state = SessionState::idle();
        self.started_at = None;
        self.span = Span::none();
    }

    fn skip_malformed(&mut self, error: &Error) {
        warn!("Skipping malformed event: {}", error);
        self.state.record_skipped();
        if let Some(metrics) = &self.metrics {
            metrics.malformed_events.inc();
        }
    }

    fn fail_transport(&mut self, message: &str) {
        if self.state.fail_transport(message) {
            self.finish();
        }
    }

    /// Release the stream and deliver the terminal notification
    fn finish(&mut self) {
        self.close_stream();

        match self.state.outcome() {
            Some(SessionOutcome::Completed(answer)) => {
                info!(
                    sources = answer.sources.len(),
                    verified = ?answer.verification.as_ref().map(|v| v.is_valid),
                    "Session completed"
                );
                self.subscriber.on_complete(answer);
            }
            Some(SessionOutcome::Failed(failure)) => {
                warn!(kind = ?failure.kind, "Session failed: {}", failure.message);
                self.subscriber.on_failure(failure);
            }
            None => {}
        }

        let label = match self.state.outcome() {
            Some(SessionOutcome::Completed(_)) => "completed",
            Some(SessionOutcome::Failed(failure)) => match failure.kind {
                FailureKind::Pipeline => "pipeline_error",
                FailureKind::Transport => "transport_error",
            },
            None => return,
        };
        self.record_finished(label);
    }

    fn record_finished(&mut self, outcome: &str) {
        let elapsed = self
            .started_at
            .take()
            .map(|started| started.elapsed().as_secs_f64())
            .unwrap_or_default();
        if let Some(metrics) = &self.metrics {
            metrics.record_finished(outcome, elapsed);
        }
    }

    fn close_stream(&mut self) {
        if self.stream.take().is_some() {
            debug!("Event stream closed");
        }
    }
}
