//! Stream transport abstraction
//!
//! The controller never talks to the network directly. A transport opens one
//! live stream per query and yields raw text messages in arrival order. An
//! `Err(MalformedEvent)` item stands for one unreadable message and is skipped;
//! any other `Err` item or the end of the stream is a transport-level failure.

use agentrag_core::Result;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Live stream of raw event payloads
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open a live event stream for the given query
    async fn open(&self, query: &str) -> Result<MessageStream>;
}

#[async_trait]
impl<T: StreamTransport + ?Sized> StreamTransport for std::sync::Arc<T> {
    async fn open(&self, query: &str) -> Result<MessageStream> {
        (**self).open(query).await
    }
}
