//! Error types for the polling client.

use thiserror::Error;

use crate::api::ApiError;
use crate::transport::TransportError;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the polling client.
///
/// Fetch-level failures are handled inside the poll loop and never reach
/// the caller; what the caller sees is limited to construction-time
/// validation, a rejected `start`, and direct failures of `get_me`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The bot token was empty at construction time.
    #[error("bot token is required")]
    MissingToken,

    /// `start` was called while the poll loop was already running.
    #[error("poller is already running")]
    AlreadyRunning,

    /// `start` was called after a completed `stop`; a stopped poller
    /// cannot be reused.
    #[error("poller has already been stopped")]
    AlreadyStopped,

    /// The updates receiver was already handed out.
    #[error("updates receiver already taken")]
    ReceiverTaken,

    /// The HTTP request could not be completed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body was not a valid envelope or result payload.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The server answered with a failure envelope.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The configured base URL or token produced an unparseable URL.
    #[error("invalid request url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
