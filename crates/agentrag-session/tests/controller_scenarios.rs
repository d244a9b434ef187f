//! Integration tests for SessionController
//!
//! These tests drive the controller through scripted in-memory streams and
//! check the state machine, the subscriber notifications, and the release of
//! the stream resource.

use agentrag_core::{AgentEvent, Error, Result, VerificationResult};
use agentrag_session::{
    CONNECTION_LOST_MESSAGE, ChannelSubscriber, FailureKind, FinalAnswer, IDLE_TIMEOUT_MESSAGE,
    MessageStream, SessionController, SessionFailure, SessionMetrics, SessionNotification,
    SessionStatus, SessionSubscriber, StreamTransport,
};
use futures::Stream;
use serde_json::json;
use std::collections::{BTreeSet, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

// What the transport does on each `open` call
enum Script {
    Messages(Vec<Result<String>>),
    Pending,
    FailOpen,
}

// Stream wrapper that counts how often it is released
struct TrackedStream {
    inner: MessageStream,
    closed: Arc<AtomicUsize>,
}

impl Stream for TrackedStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
struct ScriptedTransport {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            ..Default::default()
        }
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open(&self, query: &str) -> Result<MessageStream> {
        self.queries.lock().unwrap().push(query.to_string());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Pending);

        let inner: MessageStream = match script {
            Script::Messages(messages) => Box::pin(futures::stream::iter(messages)),
            Script::Pending => Box::pin(futures::stream::pending()),
            Script::FailOpen => {
                return Err(Error::Transport("connection refused".to_string()));
            }
        };

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(TrackedStream {
            inner,
            closed: self.closed.clone(),
        }))
    }
}

#[derive(Default)]
struct RecordingSubscriber {
    steps: Vec<AgentEvent>,
    completions: Vec<FinalAnswer>,
    failures: Vec<SessionFailure>,
}

impl SessionSubscriber for RecordingSubscriber {
    fn on_step(&mut self, event: &AgentEvent) {
        self.steps.push(event.clone());
    }

    fn on_complete(&mut self, answer: &FinalAnswer) {
        self.completions.push(answer.clone());
    }

    fn on_failure(&mut self, failure: &SessionFailure) {
        self.failures.push(failure.clone());
    }
}

fn msg(value: serde_json::Value) -> Result<String> {
    Ok(value.to_string())
}

fn start() -> Result<String> {
    msg(json!({"step": "start", "message": "Processing query"}))
}

fn retrieval(sources: &[&str]) -> Result<String> {
    let data: Vec<_> = sources
        .iter()
        .map(|s| json!({"source": s, "content": "chunk"}))
        .collect();
    msg(json!({
        "step": "retrieval_agent",
        "message": format!("Retrieved {} chunks.", data.len()),
        "data": data
    }))
}

fn verifier(is_valid: bool, reasoning: &str) -> Result<String> {
    msg(json!({
        "step": "verifier_agent",
        "message": "Verification complete.",
        "data": {"is_valid": is_valid, "reasoning": reasoning}
    }))
}

fn complete(answer: &str) -> Result<String> {
    msg(json!({
        "step": "complete",
        "message": "Workflow finished",
        "final_response": {"answer": answer}
    }))
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn controller(
    scripts: Vec<Script>,
) -> (
    SessionController<ScriptedTransport, RecordingSubscriber>,
    ScriptedTransport,
) {
    let transport = ScriptedTransport::new(scripts);
    let controller = SessionController::new(transport.clone(), RecordingSubscriber::default());
    (controller, transport)
}

#[tokio::test]
async fn test_happy_path_example() {
    let (mut controller, transport) = controller(vec![Script::Messages(vec![
        start(),
        retrieval(&["doc1", "doc2"]),
        verifier(true, "ok"),
        complete("X"),
    ])]);

    controller.submit("What is X?").await.unwrap();
    assert_eq!(controller.status(), SessionStatus::Streaming);
    assert!(controller.has_open_stream());

    let status = controller.run().await;

    assert_eq!(status, SessionStatus::Completed);
    assert!(!controller.has_open_stream());
    assert_eq!(transport.opened(), 1);
    assert_eq!(transport.closed(), 1);

    let subscriber = controller.subscriber();
    assert_eq!(subscriber.steps.len(), 3);
    assert!(subscriber.failures.is_empty());
    assert_eq!(
        subscriber.completions,
        vec![FinalAnswer {
            answer: "X".to_string(),
            sources: set(&["doc1", "doc2"]),
            verification: Some(VerificationResult {
                is_valid: true,
                reasoning: "ok".to_string(),
            }),
            warning: None,
        }]
    );
}

#[tokio::test]
async fn test_pipeline_error_example() {
    let (mut controller, transport) = controller(vec![Script::Messages(vec![
        start(),
        msg(json!({"step": "error", "message": "LLM timeout"})),
    ])]);

    controller.submit("q").await.unwrap();
    let status = controller.run().await;

    assert_eq!(status, SessionStatus::Failed);
    assert_eq!(transport.closed(), 1);

    let subscriber = controller.subscriber();
    assert!(subscriber.completions.is_empty());
    assert_eq!(
        subscriber.failures,
        vec![SessionFailure {
            kind: FailureKind::Pipeline,
            message: "LLM timeout".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_double_submit_is_busy() {
    let (mut controller, transport) = controller(vec![Script::Pending]);

    controller.submit("first query").await.unwrap();
    let session_id = controller.state().session_id().to_string();

    let err = controller.submit("second query").await.unwrap_err();
    assert!(matches!(err, Error::SessionBusy));

    // First session untouched, no second stream opened
    assert_eq!(controller.status(), SessionStatus::Streaming);
    assert_eq!(controller.state().query(), "first query");
    assert_eq!(controller.state().session_id(), session_id);
    assert_eq!(transport.opened(), 1);
    assert_eq!(transport.closed(), 0);
    assert!(controller.has_open_stream());
}

#[tokio::test]
async fn test_malformed_message_is_skipped() {
    let (mut controller, _transport) = controller(vec![Script::Messages(vec![
        start(),
        Ok("{not json".to_string()),
        Ok(r#"{"message":"no step"}"#.to_string()),
        retrieval(&["a.md"]),
        complete("answer"),
    ])]);

    controller.submit("q").await.unwrap();

    // start
    assert_eq!(controller.next().await, Some(SessionStatus::Streaming));
    // malformed
    assert_eq!(controller.next().await, Some(SessionStatus::Streaming));
    assert!(controller.state().collected_sources().is_empty());
    assert!(controller.state().verification().is_none());

    let status = controller.run().await;
    assert_eq!(status, SessionStatus::Completed);
    assert_eq!(controller.state().skipped_events(), 2);

    let subscriber = controller.subscriber();
    assert_eq!(subscriber.steps.len(), 2);
    assert_eq!(subscriber.completions[0].sources, set(&["a.md"]));
}

#[tokio::test]
async fn test_unreadable_stream_item_is_skipped() {
    let metrics = SessionMetrics::new().unwrap();
    let (controller, transport) = controller(vec![Script::Messages(vec![
        start(),
        Err(Error::MalformedEvent(
            "event payload is not valid UTF-8".to_string(),
        )),
        complete("X"),
    ])]);
    let mut controller = controller.with_metrics(metrics.clone());

    controller.submit("q").await.unwrap();
    let status = controller.run().await;

    assert_eq!(status, SessionStatus::Completed);
    assert_eq!(transport.closed(), 1);
    assert_eq!(controller.state().skipped_events(), 1);
    assert_eq!(metrics.malformed_events.get(), 1);

    let subscriber = controller.subscriber();
    assert!(subscriber.failures.is_empty());
    assert_eq!(subscriber.completions.len(), 1);
    assert_eq!(subscriber.completions[0].answer, "X");
}

#[tokio::test]
async fn test_last_verifier_visible_at_completion() {
    let (mut controller, _transport) = controller(vec![Script::Messages(vec![
        verifier(true, "looks grounded"),
        verifier(false, "claim not in context"),
        complete("answer"),
    ])]);

    controller.submit("q").await.unwrap();
    controller.run().await;

    let answer = &controller.subscriber().completions[0];
    assert_eq!(
        answer.verification,
        Some(VerificationResult {
            is_valid: false,
            reasoning: "claim not in context".to_string(),
        })
    );
}

#[tokio::test]
async fn test_sources_come_from_last_retrieval() {
    let (mut controller, _transport) = controller(vec![Script::Messages(vec![
        retrieval(&["first.md", "shared.md"]),
        msg(json!({"step": "retrieval_agent", "message": "odd", "data": {"source": "x"}})),
        retrieval(&["shared.md", "second.pdf", "shared.md"]),
        complete("answer"),
    ])]);

    controller.submit("q").await.unwrap();
    controller.run().await;

    assert_eq!(
        controller.subscriber().completions[0].sources,
        set(&["second.pdf", "shared.md"])
    );
}

#[tokio::test]
async fn test_reset_during_streaming() {
    let (mut controller, transport) = controller(vec![
        Script::Pending,
        Script::Messages(vec![start(), complete("fresh")]),
    ]);

    controller.submit("abandoned").await.unwrap();
    controller.reset();

    assert_eq!(controller.status(), SessionStatus::Idle);
    assert!(!controller.has_open_stream());
    assert_eq!(transport.closed(), 1);
    assert!(controller.subscriber().completions.is_empty());
    assert!(controller.subscriber().failures.is_empty());

    controller.submit("fresh query").await.unwrap();
    let status = controller.run().await;

    assert_eq!(status, SessionStatus::Completed);
    assert_eq!(transport.opened(), 2);
    assert_eq!(transport.closed(), 2);
    assert_eq!(controller.subscriber().completions.len(), 1);
    assert_eq!(controller.subscriber().completions[0].answer, "fresh");
}

#[tokio::test]
async fn test_reset_when_idle_is_noop() {
    let (mut controller, transport) = controller(vec![]);
    controller.reset();
    assert_eq!(controller.status(), SessionStatus::Idle);
    assert_eq!(transport.closed(), 0);
}

#[tokio::test]
async fn test_transport_error_fails_session() {
    let (mut controller, transport) = controller(vec![Script::Messages(vec![
        start(),
        retrieval(&["doc1"]),
        Err(Error::Transport("connection reset by peer".to_string())),
        complete("never seen"),
    ])]);

    controller.submit("q").await.unwrap();
    let status = controller.run().await;

    assert_eq!(status, SessionStatus::Failed);
    assert_eq!(transport.closed(), 1);

    let subscriber = controller.subscriber();
    assert!(subscriber.completions.is_empty());
    assert_eq!(
        subscriber.failures,
        vec![SessionFailure {
            kind: FailureKind::Transport,
            message: CONNECTION_LOST_MESSAGE.to_string(),
        }]
    );
}

#[tokio::test]
async fn test_stream_end_without_terminal_event() {
    let (mut controller, _transport) =
        controller(vec![Script::Messages(vec![start(), retrieval(&["doc1"])])]);

    controller.submit("q").await.unwrap();
    let status = controller.run().await;

    assert_eq!(status, SessionStatus::Failed);
    assert_eq!(controller.subscriber().failures.len(), 1);
    assert_eq!(
        controller.subscriber().failures[0].kind,
        FailureKind::Transport
    );
}

#[tokio::test]
async fn test_open_failure_fails_session() {
    let (mut controller, transport) = controller(vec![Script::FailOpen]);

    controller.submit("q").await.unwrap();

    assert_eq!(controller.status(), SessionStatus::Failed);
    assert!(!controller.has_open_stream());
    assert_eq!(transport.opened(), 0);
    assert_eq!(controller.subscriber().failures.len(), 1);

    // Nothing left to drive
    assert_eq!(controller.next().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_fails_session() {
    let (controller, transport) = controller(vec![Script::Pending]);
    let mut controller = controller.with_idle_timeout(Duration::from_secs(30));

    controller.submit("q").await.unwrap();
    let status = controller.run().await;

    assert_eq!(status, SessionStatus::Failed);
    assert_eq!(transport.closed(), 1);
    assert_eq!(
        controller.subscriber().failures[0].message,
        IDLE_TIMEOUT_MESSAGE
    );
}

#[tokio::test]
async fn test_events_after_terminal_are_ignored() {
    let (mut controller, _transport) = controller(vec![Script::Messages(vec![
        complete("first"),
        retrieval(&["late.md"]),
        msg(json!({"step": "error", "message": "late error"})),
    ])]);

    controller.submit("q").await.unwrap();
    controller.run().await;

    // Messages pushed after completion change nothing
    controller.handle_message(&json!({"step": "error", "message": "pushed"}).to_string());
    controller.handle_transport_error("late disconnect");

    let subscriber = controller.subscriber();
    assert_eq!(controller.status(), SessionStatus::Completed);
    assert_eq!(subscriber.completions.len(), 1);
    assert!(subscriber.failures.is_empty());
    assert!(subscriber.steps.is_empty());
    assert!(controller.state().collected_sources().is_empty());
}

#[tokio::test]
async fn test_new_submit_after_terminal_starts_clean_session() {
    let (mut controller, _transport) = controller(vec![
        Script::Messages(vec![retrieval(&["doc1"]), verifier(true, "ok"), complete("a")]),
        Script::Pending,
    ]);

    controller.submit("first").await.unwrap();
    controller.run().await;
    let first_id = controller.state().session_id().to_string();

    controller.submit("second").await.unwrap();

    assert_eq!(controller.status(), SessionStatus::Streaming);
    assert_eq!(controller.state().query(), "second");
    assert_ne!(controller.state().session_id(), first_id);
    assert!(controller.state().collected_sources().is_empty());
    assert!(controller.state().verification().is_none());
    assert!(controller.state().outcome().is_none());
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let (mut controller, transport) = controller(vec![]);

    let err = controller.submit("   ").await.unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));
    assert_eq!(controller.status(), SessionStatus::Idle);
    assert_eq!(transport.opened(), 0);
}

#[tokio::test]
async fn test_query_is_trimmed_before_opening() {
    let (mut controller, transport) = controller(vec![Script::Pending]);

    controller.submit("  What is RAG?\n").await.unwrap();

    assert_eq!(controller.state().query(), "What is RAG?");
    assert_eq!(
        transport.queries.lock().unwrap().as_slice(),
        ["What is RAG?".to_string()]
    );
}

#[tokio::test]
async fn test_push_mode_without_stream() {
    let (mut controller, _transport) = controller(vec![Script::Pending]);
    controller.submit("q").await.unwrap();

    controller.handle_message(&start().unwrap());
    controller.handle_message(&retrieval(&["pushed.md"]).unwrap());
    controller.handle_message(&complete("pushed answer").unwrap());

    assert_eq!(controller.status(), SessionStatus::Completed);
    assert!(!controller.has_open_stream());
    assert_eq!(
        controller.subscriber().completions[0].sources,
        set(&["pushed.md"])
    );
}

#[tokio::test]
async fn test_metrics_recorded() {
    let metrics = SessionMetrics::new().unwrap();
    let (controller, _transport) = controller(vec![
        Script::Messages(vec![start(), Ok("garbage".to_string()), complete("a")]),
        Script::Pending,
    ]);
    let mut controller = controller.with_metrics(metrics.clone());

    controller.submit("one").await.unwrap();
    controller.run().await;
    controller.submit("two").await.unwrap();
    let _ = controller.submit("three").await;
    controller.reset();

    assert_eq!(metrics.sessions_started.get(), 2);
    assert_eq!(metrics.busy_rejections.get(), 1);
    assert_eq!(metrics.malformed_events.get(), 1);
    assert_eq!(metrics.events_total.with_label_values(&["start"]).get(), 1);
    assert_eq!(
        metrics
            .sessions_finished
            .with_label_values(&["completed"])
            .get(),
        1
    );
    assert_eq!(
        metrics.sessions_finished.with_label_values(&["reset"]).get(),
        1
    );
}

#[tokio::test]
async fn test_open_failure_not_counted_as_started() {
    let metrics = SessionMetrics::new().unwrap();
    let (controller, _transport) = controller(vec![Script::FailOpen]);
    let mut controller = controller.with_metrics(metrics.clone());

    controller.submit("q").await.unwrap();

    assert_eq!(controller.status(), SessionStatus::Failed);
    assert_eq!(metrics.sessions_started.get(), 0);
    assert_eq!(
        metrics
            .sessions_finished
            .with_label_values(&["transport_error"])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_channel_subscriber_receives_ordered_notifications() {
    let transport = ScriptedTransport::new(vec![Script::Messages(vec![
        start(),
        retrieval(&["doc1"]),
        complete("X"),
    ])]);
    let (subscriber, mut rx) = ChannelSubscriber::channel();
    let mut controller = SessionController::new(transport, subscriber);

    controller.submit("q").await.unwrap();
    controller.run().await;
    drop(controller);

    let mut notifications = Vec::new();
    while let Some(notification) = rx.recv().await {
        notifications.push(notification);
    }

    assert_eq!(notifications.len(), 3);
    assert!(matches!(
        notifications[0],
        SessionNotification::Step(AgentEvent::Start { .. })
    ));
    assert!(matches!(
        notifications[2],
        SessionNotification::Complete(ref answer) if answer.answer == "X"
    ));
}
