//! Upload transport abstraction.
//!
//! The submission client only needs "POST these JSON bytes to this path".
//! [`HttpTransport`] does that over reqwest; [`mock::MockTransport`] records
//! requests in memory.

use crate::config::SyncConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised while delivering a request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, timeout or protocol failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("{0}")]
    Other(String),
}

/// Delivers JSON payloads to the ingestion endpoint.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// POSTs `body` (already-encoded JSON) to `path`, relative to the
    /// endpoint base URL. Succeeds only on a success status.
    async fn post_json(&self, path: &str, body: Vec<u8>) -> TransportResult<()>;
}

/// HTTP transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Builds a client with the configured request timeout.
    pub fn new(config: &SyncConfig) -> TransportResult<Self> {
        let base_url = config.endpoint_base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(TransportError::InvalidEndpoint(config.endpoint_base_url.clone()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn post_json(&self, path: &str, body: Vec<u8>) -> TransportResult<()> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {} ({} bytes)", url, body.len());

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// A mock transport for testing.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// A request captured by [`MockTransport`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedRequest {
        pub path: String,
        pub body: Vec<u8>,
    }

    impl RecordedRequest {
        /// Decodes the body as JSON.
        pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
            serde_json::from_slice(&self.body)
        }
    }

    #[derive(Debug, Default)]
    struct Inner {
        requests: Vec<RecordedRequest>,
        fail_all: Option<u16>,
        fail_paths: HashMap<String, u16>,
    }

    /// Records every request; can be told to answer with an error status.
    #[derive(Debug, Default)]
    pub struct MockTransport {
        inner: Mutex<Inner>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn inner(&self) -> MutexGuard<'_, Inner> {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Answers every request with `status` (or succeeds again on `None`).
        pub fn fail_all(&self, status: Option<u16>) {
            self.inner().fail_all = status;
        }

        /// Answers requests to `path` with `status`.
        pub fn fail_path(&self, path: impl Into<String>, status: u16) {
            self.inner().fail_paths.insert(path.into(), status);
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.inner().requests.clone()
        }

        /// Requests sent to `path`, in order.
        pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
            self.inner()
                .requests
                .iter()
                .filter(|r| r.path == path)
                .cloned()
                .collect()
        }

        pub fn request_count(&self) -> usize {
            self.inner().requests.len()
        }
    }

    #[async_trait]
    impl UploadTransport for MockTransport {
        async fn post_json(&self, path: &str, body: Vec<u8>) -> TransportResult<()> {
            let mut inner = self.inner();
            inner.requests.push(RecordedRequest {
                path: path.to_string(),
                body,
            });
            match inner.fail_paths.get(path).copied().or(inner.fail_all) {
                Some(status) => Err(TransportError::Status {
                    status,
                    body: "mock failure".into(),
                }),
                None => Ok(()),
            }
        }
    }
}
