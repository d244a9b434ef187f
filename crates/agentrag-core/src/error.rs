//! Error types for AgentRAG Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("A session is already streaming")]
    SessionBusy,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // Terminal session failures
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    // Auxiliary endpoint errors
    #[error("HTTP {status_code}: {message}")]
    Http { status_code: u16, message: String },

    #[error("Unsupported document type: {0}")]
    UnsupportedDocument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures that end a session (as opposed to caller mistakes)
    pub fn is_session_failure(&self) -> bool {
        matches!(self, Error::Pipeline(_) | Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
