//! AgentRAG HTTP Client
//!
//! This crate talks to the agentic RAG backend:
//! - Server-Sent Events transport for query sessions
//! - Health and document endpoints

pub mod api;
pub mod client;
pub mod sse;

pub use api::{ApiClient, DocumentInfo, HealthStatus, UploadReceipt, is_supported_document};
pub use client::{HttpClientConfig, create_client};
pub use sse::SseTransport;
