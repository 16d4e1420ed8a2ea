//! The success/failure envelope every API response is wrapped in.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ClientError, Result};

/// Generic response envelope.
///
/// On success `ok` is true and `result` holds the method's payload. On
/// failure `ok` is false and `error_code`/`description` explain why, with
/// optional extra `parameters` such as a rate-limit retry hint.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
}

/// Additional parameters attached to failure envelopes.
#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    #[serde(default)]
    pub retry_after: Option<u64>,
    #[serde(default)]
    pub migrate_to_chat_id: Option<i64>,
}

/// An error reported by the API in a failure envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Numeric error code, mirroring HTTP status classes.
    pub code: i64,
    /// Human-readable description from the server.
    pub description: String,
    /// Server-mandated wait before the next attempt, when rate limited.
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// Rate-limited and server-side failures are worth retrying; other
    /// client-side codes need caller intervention.
    pub fn is_retryable(&self) -> bool {
        self.retry_after.is_some() || self.code >= 500
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.retry_after {
            Some(after) => write!(
                f,
                "api error {}: {} (retry after {}s)",
                self.code,
                self.description,
                after.as_secs()
            ),
            None => write!(f, "api error {}: {}", self.code, self.description),
        }
    }
}

impl std::error::Error for ApiError {}

/// Decode a raw response body into the envelope and extract its result.
///
/// A failure envelope becomes an [`ApiError`]; a malformed body becomes a
/// decode error. Both are retryable or not per the loop's classification,
/// never interpreted here.
pub fn decode_response<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let envelope: ApiResponse = serde_json::from_str(body)?;

    if !envelope.ok {
        return Err(ClientError::Api(ApiError {
            code: envelope.error_code.unwrap_or_default(),
            description: envelope.description.unwrap_or_default(),
            retry_after: envelope
                .parameters
                .and_then(|p| p.retry_after)
                .map(Duration::from_secs),
        }));
    }

    let result = envelope.result.unwrap_or(serde_json::Value::Null);
    Ok(serde_json::from_value(result)?)
}
