//! Server-Sent Events transport
//!
//! Opens `GET {base_url}/stream_query?q=<query>` and yields the `data` payload
//! of every unnamed event in arrival order. Connection errors, non-2xx
//! responses and mid-stream read errors surface as [`Error::Transport`]; an
//! event that cannot be read surfaces as [`Error::MalformedEvent`] and the
//! stream carries on.

use crate::client::{HttpClientConfig, create_client, endpoint_url};
use agentrag_core::{Error, Result};
use agentrag_session::{MessageStream, StreamTransport};
use async_trait::async_trait;
use eventsource_stream::EventStreamError;
use futures::StreamExt;
use reqwest::{Client, Url, header};
use tracing::{debug, instrument};

/// Path of the streaming query endpoint
const STREAM_PATH: &str = "stream_query";

/// SSE transport for query sessions
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: Client,
    base_url: String,
}

impl SseTransport {
    /// Create a transport with its own HTTP client
    pub fn new(base_url: impl Into<String>, config: &HttpClientConfig) -> Result<Self> {
        Ok(Self::with_client(create_client(config)?, base_url))
    }

    /// Create a transport sharing an existing HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// URL of the stream for `query`; the query is the only parameter
    pub fn stream_url(&self, query: &str) -> Result<Url> {
        let mut url = endpoint_url(&self.base_url, &[STREAM_PATH])?;
        url.query_pairs_mut().append_pair("q", query);
        Ok(url)
    }
}

#[async_trait]
impl StreamTransport for SseTransport {
    #[instrument(skip(self, query))]
    async fn open(&self, query: &str) -> Result<MessageStream> {
        let url = self.stream_url(query)?;
        debug!("Opening event stream at {}", url.path());

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to connect: {}", e)))?;

        debug!("┌─────────────────────────────────────────────────────────");
        debug!("│ Event Stream Response Headers");
        debug!("├─────────────────────────────────────────────────────────");
        debug!("│ Status: {}", response.status());
        for (name, value) in response.headers() {
            if let Ok(val_str) = value.to_str() {
                debug!("│ {}: {}", name, val_str);
            }
        }
        debug!("└─────────────────────────────────────────────────────────");

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(Error::Transport(format!(
                "Stream request failed with HTTP {}: {}",
                status, body
            )));
        }

        Ok(create_message_stream(response))
    }
}

/// Event type the backend uses for pipeline messages; named events are not part
/// of the protocol
const MESSAGE_EVENT: &str = "message";

fn create_message_stream(response: reqwest::Response) -> MessageStream {
    let text_stream = response
        .bytes_stream()
        .scan(Vec::new(), |pending: &mut Vec<u8>, chunk| {
            let item = chunk.map(|bytes| {
                pending.extend_from_slice(&bytes);
                decode_utf8_lossy(pending)
            });
            futures::future::ready(Some(item))
        });
    let event_stream = eventsource_stream::EventStream::new(text_stream);

    let stream = event_stream.filter_map(|result| {
        let item = match result {
            Ok(event) if event.event != MESSAGE_EVENT => {
                debug!("Ignoring named event '{}'", event.event);
                None
            }
            // Keep-alive events carry no payload
            Ok(event) if event.data.trim().is_empty() => None,
            // The backend sends ASCII-only JSON, so a replacement character
            // means the bytes of this event were damaged
            Ok(event) if event.data.contains(char::REPLACEMENT_CHARACTER) => Some(Err(
                Error::MalformedEvent("event payload is not valid UTF-8".to_string()),
            )),
            Ok(event) => Some(Ok(event.data)),
            Err(EventStreamError::Transport(e)) => {
                Some(Err(Error::Transport(format!("Stream error: {}", e))))
            }
            Err(e) => Some(Err(Error::MalformedEvent(e.to_string()))),
        };
        futures::future::ready(item)
    });

    Box::pin(stream)
}

/// Drain the decodable prefix of `pending` as text.
///
/// Invalid sequences become U+FFFD; an incomplete sequence at the end stays
/// in `pending` until the next chunk arrives.
fn decode_utf8_lossy(pending: &mut Vec<u8>) -> String {
    let mut text = String::new();
    loop {
        match std::str::from_utf8(pending.as_slice()) {
            Ok(valid) => {
                text.push_str(valid);
                pending.clear();
                return text;
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                text.push_str(&String::from_utf8_lossy(&pending[..valid_up_to]));
                match e.error_len() {
                    Some(invalid) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid_up_to + invalid);
                    }
                    None => {
                        pending.drain(..valid_up_to);
                        return text;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base_url: &str) -> SseTransport {
        SseTransport::new(base_url, &HttpClientConfig::default()).unwrap()
    }

    #[test]
    fn test_stream_url_encodes_query() {
        let url = transport("http://localhost:8000")
            .stream_url("What is Amazon Bedrock? & IAM")
            .unwrap();

        assert_eq!(url.path(), "/stream_query");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![("q".to_string(), "What is Amazon Bedrock? & IAM".to_string())]
        );
        assert!(!url.as_str().contains(' '));
    }

    #[test]
    fn test_stream_url_invalid_base() {
        let err = transport("::nope").stream_url("q").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_decode_utf8_lossy_keeps_split_sequences() {
        // "é" is 0xC3 0xA9; the first chunk ends mid-character
        let mut pending = b"caf\xC3".to_vec();
        assert_eq!(decode_utf8_lossy(&mut pending), "caf");
        assert_eq!(pending, vec![0xC3]);

        pending.extend_from_slice(b"\xA9!");
        assert_eq!(decode_utf8_lossy(&mut pending), "café!");
        assert!(pending.is_empty());
    }

    #[test]
    fn test_decode_utf8_lossy_replaces_invalid_bytes() {
        let mut pending = b"a\xFF\xFEb\n".to_vec();
        assert_eq!(decode_utf8_lossy(&mut pending), "a\u{FFFD}\u{FFFD}b\n");
        assert!(pending.is_empty());
    }
}
