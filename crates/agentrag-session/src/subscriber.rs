//! Session subscriber interface
//!
//! The view layer observes a session through three notifications: one per
//! non-terminal step, and exactly one of `on_complete` / `on_failure` when the
//! session ends. Sessions abandoned through `reset()` produce neither.

use crate::state::{FinalAnswer, SessionFailure};
use agentrag_core::AgentEvent;
use tokio::sync::mpsc;

pub trait SessionSubscriber: Send {
    /// A non-terminal event arrived
    fn on_step(&mut self, event: &AgentEvent);

    /// The session completed with an answer
    fn on_complete(&mut self, answer: &FinalAnswer);

    /// The session failed
    fn on_failure(&mut self, failure: &SessionFailure);
}

impl<S: SessionSubscriber + ?Sized> SessionSubscriber for Box<S> {
    fn on_step(&mut self, event: &AgentEvent) {
        (**self).on_step(event)
    }

    fn on_complete(&mut self, answer: &FinalAnswer) {
        (**self).on_complete(answer)
    }

    fn on_failure(&mut self, failure: &SessionFailure) {
        (**self).on_failure(failure)
    }
}

/// Notification forwarded by [`ChannelSubscriber`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    Step(AgentEvent),
    Complete(FinalAnswer),
    Failure(SessionFailure),
}

impl SessionNotification {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionNotification::Step(_))
    }
}

/// Subscriber that forwards notifications over an unbounded channel, for
/// consumers running on another task
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<SessionNotification>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: SessionNotification) {
        // A dropped receiver means nobody is watching anymore
        if self.tx.send(notification).is_err() {
            tracing::trace!("Session notification dropped: receiver closed");
        }
    }
}

impl SessionSubscriber for ChannelSubscriber {
    fn on_step(&mut self, event: &AgentEvent) {
        self.send(SessionNotification::Step(event.clone()));
    }

    fn on_complete(&mut self, answer: &FinalAnswer) {
        self.send(SessionNotification::Complete(answer.clone()));
    }

    fn on_failure(&mut self, failure: &SessionFailure) {
        self.send(SessionNotification::Failure(failure.clone()));
    }
}
