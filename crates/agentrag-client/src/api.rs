//! Health and document endpoints
//!
//! Thin request/response bindings used by the view layer. They do not take
//! part in query sessions.

use crate::client::{HttpClientConfig, create_client, endpoint_url};
use agentrag_core::{Error, Result};
use reqwest::{Client, RequestBuilder, Response, multipart};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Document extensions accepted by the knowledge base
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "pdf"];

/// Whether `path` has an extension the knowledge base accepts
pub fn is_supported_document(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// Backend status reported by `/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,

    /// LLM provider identifier (e.g. "bedrock", "mock")
    #[serde(default)]
    pub provider: String,

    #[serde(default)]
    pub environment: Option<String>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// Result of a document upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub status: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub message: String,
}

/// One document in the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub name: String,
    pub size: u64,
    /// Modification time as Unix seconds
    #[serde(default)]
    pub modified: f64,
}

#[derive(Deserialize)]
struct DocumentList {
    #[serde(default)]
    documents: Vec<DocumentInfo>,
}

/// Client for the backend's request/response endpoints
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, config: &HttpClientConfig) -> Result<Self> {
        let client = create_client(config)?;
        Ok(Self::with_client(client, base_url, config))
    }

    /// Create an API client sharing an existing HTTP client
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        config: &HttpClientConfig,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Fetch backend health and provider information
    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<HealthStatus> {
        let url = endpoint_url(&self.base_url, &["health"])?;
        let response = self.send(self.client.get(url)).await?;
        parse_json(response).await
    }

    /// Upload a document to the knowledge base
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn upload_document(&self, path: impl AsRef<Path>) -> Result<UploadReceipt> {
        let path = path.as_ref();
        if !is_supported_document(path) {
            return Err(Error::UnsupportedDocument(path.display().to_string()));
        }

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::UnsupportedDocument(path.display().to_string()))?
            .to_string();

        let bytes = tokio::fs::read(path).await?;
        debug!("Uploading {} ({} bytes)", file_name, bytes.len());

        let part = multipart::Part::bytes(bytes).file_name(file_name);
        let form = multipart::Form::new().part("file", part);

        let url = endpoint_url(&self.base_url, &["upload_document"])?;
        let response = self.send(self.client.post(url).multipart(form)).await?;
        let receipt: UploadReceipt = parse_json(response).await?;

        info!("Uploaded document {}", receipt.filename);
        Ok(receipt)
    }

    /// List the documents in the knowledge base
    #[instrument(skip(self))]
    pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        let url = endpoint_url(&self.base_url, &["documents"])?;
        let response = self.send(self.client.get(url)).await?;
        let list: DocumentList = parse_json(response).await?;
        Ok(list.documents)
    }

    /// Delete a document by file name
    #[instrument(skip(self))]
    pub async fn delete_document(&self, name: &str) -> Result<()> {
        let url = endpoint_url(&self.base_url, &["documents", name])?;
        self.send(self.client.delete(url)).await?;
        info!("Deleted document {}", name);
        Ok(())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());

        Err(Error::Http {
            status_code: status.as_u16(),
            message: error_message(&body),
        })
    }
}

/// The backend reports failures as `{"status": "error", "message": ...}`
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("detail"))
                .map(|message| match message.as_str() {
                    Some(text) => text.to_string(),
                    None => message.to_string(),
                })
        })
        .unwrap_or_else(|| body.to_string())
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|e| Error::Transport(format!("Failed to read response body: {}", e)))?;
    Ok(serde_json::from_str(&body)?)
}
