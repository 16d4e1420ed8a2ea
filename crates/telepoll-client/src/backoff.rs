//! Retry backoff strategies.

use std::time::Duration;

use rand::Rng;

/// Default initial wait for the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Default hard cap on a single wait.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);
/// Default growth factor between attempts.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Maps a retry attempt count to a wait duration.
///
/// Strategies are swappable via
/// [`PollerConfig::with_backoff`](crate::PollerConfig::with_backoff) to
/// allow jittered or custom policies.
pub trait BackoffStrategy: Send + Sync {
    /// The duration to wait before the next retry. `attempt` is
    /// 0-indexed: the first retry in a failure streak is attempt 0.
    fn next_backoff(&self, attempt: u32) -> Duration;

    /// Clear any internal memory after a successful fetch.
    fn reset(&self);
}

/// Exponential backoff: attempt 0 yields the initial interval, each
/// subsequent attempt multiplies by the growth factor until the cap is
/// reached and held.
///
/// An optional jitter factor (0.0-1.0) spreads waits by that fraction in
/// either direction to avoid thundering herds.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_BACKOFF,
            max_interval: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: 0.0,
        }
    }
}

impl ExponentialBackoff {
    /// Create a backoff with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wait for the first retry.
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the hard cap on a single wait.
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set the growth factor between attempts.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Set the jitter factor (0.0-1.0).
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_backoff(&self, attempt: u32) -> Duration {
        let cap = self.max_interval.as_secs_f64();
        let mut backoff = self.initial_interval.as_secs_f64();

        for _ in 0..attempt {
            backoff *= self.multiplier;
            if backoff >= cap {
                backoff = cap;
                break;
            }
        }

        if self.jitter > 0.0 {
            let range = backoff * self.jitter;
            let offset = rand::thread_rng().gen_range(-range..=range);
            backoff = (backoff + offset).max(0.0);
        }

        Duration::from_secs_f64(backoff)
    }

    // The full schedule is recomputed from the attempt index, so there
    // is no state to clear.
    fn reset(&self) {}
}
