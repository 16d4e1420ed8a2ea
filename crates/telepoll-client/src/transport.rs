//! HTTP seam between the engine and the network.
//!
//! The poll loop only ever needs "GET this URL, give me the body", so
//! that is the whole contract. Tests drive the engine with scripted
//! fakes; production uses the reqwest-backed [`HttpTransport`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use thiserror::Error;
use url::Url;

/// Failure at the HTTP layer, before any envelope decoding.
#[derive(Debug, Error)]
#[error("request failed: {0}")]
pub struct TransportError(pub String);

/// Issues a request and returns the raw response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: Url) -> std::result::Result<String, TransportError>;
}

/// Default transport backed by a shared reqwest client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// `timeout` should be the long-poll timeout; a 10s buffer is added
    /// on top so the client does not cut off a held poll.
    pub fn new(timeout: Duration) -> std::result::Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout + Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: Url) -> std::result::Result<String, TransportError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))
    }
}
