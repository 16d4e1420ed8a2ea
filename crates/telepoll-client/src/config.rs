//! Poller configuration.
//!
//! Built with `PollerConfig::new(token)` plus `with_*` setters, then
//! frozen by validation inside [`Poller::new`](crate::Poller::new).
//! Validation fills every unset field with its documented default and
//! rejects a missing token.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{BackoffStrategy, ExponentialBackoff};
use crate::error::{ClientError, Result};
use crate::transport::Transport;
use crate::types::UpdateKind;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
/// Default minimum spacing between fetch calls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default long-poll timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Protocol ceiling for the long-poll timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(50);
/// Default maximum retry attempts per failure streak.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default outbound queue capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Configuration for a [`Poller`](crate::Poller).
#[derive(Clone)]
pub struct PollerConfig {
    /// Bot API credential token (required).
    pub token: String,

    /// API base URL; useful to point at a test server.
    pub base_url: String,

    /// Minimum time between polling requests.
    pub poll_interval: Duration,

    /// Long-poll timeout, clamped to [`MAX_TIMEOUT`].
    pub timeout: Duration,

    /// Maximum consecutive retry attempts before the loop gives up.
    pub max_retries: u32,

    /// Strategy for calculating retry delays.
    pub backoff: Arc<dyn BackoffStrategy>,

    /// Update categories to receive; empty means all.
    pub allowed_updates: Vec<UpdateKind>,

    /// Buffer size of the outbound updates queue.
    pub channel_capacity: usize,

    /// Transport override; `None` selects the reqwest-backed default
    /// with a timeout derived from `timeout`.
    pub transport: Option<Arc<dyn Transport>>,
}

impl PollerConfig {
    /// Create a configuration with the given token and defaults for
    /// everything else.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Arc::new(ExponentialBackoff::new()),
            allowed_updates: Vec::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            transport: None,
        }
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the minimum spacing between fetch calls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the long-poll timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum retry attempts per failure streak.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Swap in a custom backoff strategy.
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffStrategy>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Restrict the update categories to receive.
    pub fn with_allowed_updates(mut self, allowed: impl Into<Vec<UpdateKind>>) -> Self {
        self.allowed_updates = allowed.into();
        self
    }

    /// Set the outbound queue capacity.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Swap in a custom transport.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Check the configuration and normalize edge values.
    pub(crate) fn validate(&mut self) -> Result<()> {
        if self.token.is_empty() {
            return Err(ClientError::MissingToken);
        }

        if self.base_url.is_empty() {
            self.base_url = DEFAULT_BASE_URL.to_string();
        }
        while self.base_url.ends_with('/') {
            self.base_url.pop();
        }

        if self.poll_interval.is_zero() {
            self.poll_interval = DEFAULT_POLL_INTERVAL;
        }

        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        if self.timeout > MAX_TIMEOUT {
            self.timeout = MAX_TIMEOUT;
        }

        if self.channel_capacity == 0 {
            self.channel_capacity = DEFAULT_CHANNEL_CAPACITY;
        }

        Ok(())
    }
}

impl fmt::Debug for PollerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollerConfig")
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("allowed_updates", &self.allowed_updates)
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}
