//! Session metrics with Prometheus
//!
//! - Sessions started and finished (by outcome)
//! - Single-flight rejections
//! - Events received (by step) and malformed events skipped
//! - Session duration

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector for streaming sessions
#[derive(Clone)]
pub struct SessionMetrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Sessions that opened a stream
    pub sessions_started: IntCounter,
    /// Sessions that ended, by outcome
    pub sessions_finished: IntCounterVec,
    /// Submits rejected because a session was streaming
    pub busy_rejections: IntCounter,
    /// Decoded events, by step
    pub events_total: IntCounterVec,
    /// Stream messages that failed to decode
    pub malformed_events: IntCounter,
    /// Time from submit to the end of the session
    pub session_duration_seconds: HistogramVec,
}

impl SessionMetrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let sessions_started = IntCounter::with_opts(Opts::new(
            "agentrag_sessions_started_total",
            "Total number of sessions that opened a stream",
        ))?;

        let sessions_finished = IntCounterVec::new(
            Opts::new(
                "agentrag_sessions_finished_total",
                "Total number of sessions that ended",
            ),
            &["outcome"],
        )?;

        let busy_rejections = IntCounter::with_opts(Opts::new(
            "agentrag_session_busy_rejections_total",
            "Submits rejected because a session was already streaming",
        ))?;

        let events_total = IntCounterVec::new(
            Opts::new("agentrag_events_total", "Total number of decoded events"),
            &["step"],
        )?;

        let malformed_events = IntCounter::with_opts(Opts::new(
            "agentrag_malformed_events_total",
            "Stream messages skipped because they failed to decode",
        ))?;

        let session_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "agentrag_session_duration_seconds",
                "Session duration from submit to terminal state in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["outcome"],
        )?;

        registry.register(Box::new(sessions_started.clone()))?;
        registry.register(Box::new(sessions_finished.clone()))?;
        registry.register(Box::new(busy_rejections.clone()))?;
        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(malformed_events.clone()))?;
        registry.register(Box::new(session_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            sessions_started,
            sessions_finished,
            busy_rejections,
            events_total,
            malformed_events,
            session_duration_seconds,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_event(&self, step: &str) {
        self.events_total.with_label_values(&[step]).inc();
    }

    /// Record the end of a session
    pub fn record_finished(&self, outcome: &str, duration_secs: f64) {
        self.sessions_finished.with_label_values(&[outcome]).inc();
        self.session_duration_seconds
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
