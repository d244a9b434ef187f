//! AgentRAG Core Types
//!
//! This crate provides the fundamental types shared by the AgentRAG client:
//! - Agent progress events streamed by the pipeline
//! - The event decoder for raw stream messages
//! - Core error types

pub mod decoder;
pub mod error;
pub mod events;

pub use decoder::decode_event;
pub use error::{Error, Result};
pub use events::{AgentEvent, FinalResponse, StepKind, VerificationResult};
