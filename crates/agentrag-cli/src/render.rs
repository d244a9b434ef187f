//! Terminal rendering of session notifications

use agentrag_client::DocumentInfo;
use agentrag_core::AgentEvent;
use agentrag_session::{FinalAnswer, SessionFailure, SessionSubscriber};
use chrono::{DateTime, Local};
use std::io::{self, Write};

/// Renders a session to a terminal (or any writer)
pub struct TerminalRenderer<W> {
    out: W,
    show_step_data: bool,
}

impl TerminalRenderer<io::Stdout> {
    pub fn stdout(show_step_data: bool) -> Self {
        Self::new(io::stdout(), show_step_data)
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, show_step_data: bool) -> Self {
        Self {
            out,
            show_step_data,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_step(&mut self, event: &AgentEvent) -> io::Result<()> {
        let time = Local::now().format("%H:%M:%S");
        match event.message() {
            Some(message) if !message.is_empty() => {
                writeln!(self.out, "[{}] {}: {}", time, event.label(), message)?
            }
            _ => writeln!(self.out, "[{}] {}", time, event.label())?,
        }

        if self.show_step_data
            && let Some(data) = event.data()
        {
            let pretty = serde_json::to_string_pretty(data)
                .unwrap_or_else(|e| format!("Serialization error: {}", e));
            for line in pretty.lines() {
                writeln!(self.out, "    {}", line)?;
            }
        }

        self.out.flush()
    }

    fn write_answer(&mut self, answer: &FinalAnswer) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", answer.answer)?;

        if !answer.sources.is_empty() {
            let tags: Vec<String> = answer
                .sources
                .iter()
                .map(|source| format!("[{}]", source))
                .collect();
            writeln!(self.out)?;
            writeln!(self.out, "Sources: {}", tags.join(" "))?;
        }

        if let Some(verification) = &answer.verification {
            let badge = if verification.is_valid {
                "Verified"
            } else {
                "Unverified"
            };
            if verification.reasoning.is_empty() {
                writeln!(self.out, "{}", badge)?;
            } else {
                writeln!(self.out, "{}: {}", badge, verification.reasoning)?;
            }
        }

        if let Some(warning) = &answer.warning {
            writeln!(self.out, "Warning: {}", warning)?;
        }

        self.out.flush()
    }

    fn write_failure(&mut self, failure: &SessionFailure) -> io::Result<()> {
        writeln!(self.out, "Error: {}", failure.message)?;
        self.out.flush()
    }
}

impl<W: Write + Send> SessionSubscriber for TerminalRenderer<W> {
    fn on_step(&mut self, event: &AgentEvent) {
        if let Err(e) = self.write_step(event) {
            tracing::warn!("Failed to render step: {}", e);
        }
    }

    fn on_complete(&mut self, answer: &FinalAnswer) {
        if let Err(e) = self.write_answer(answer) {
            tracing::warn!("Failed to render answer: {}", e);
        }
    }

    fn on_failure(&mut self, failure: &SessionFailure) {
        if let Err(e) = self.write_failure(failure) {
            tracing::warn!("Failed to render failure: {}", e);
        }
    }
}

/// Human-readable file size: `B`, `KB` or `MB` with one decimal
pub fn format_file_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    let size = bytes as f64;
    if size < KB {
        format!("{} B", bytes)
    } else if size < MB {
        format!("{:.1} KB", size / KB)
    } else {
        format!("{:.1} MB", size / MB)
    }
}

/// One line of the document listing
pub fn format_document(document: &DocumentInfo) -> String {
    let modified = DateTime::from_timestamp(document.modified as i64, 0)
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{:<40} {:>10}  {}",
        document.name,
        format_file_size(document.size),
        modified
    )
}
