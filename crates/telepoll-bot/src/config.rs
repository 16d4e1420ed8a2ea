//! Environment-driven configuration for the bot binary.
//!
//! Values come from environment variables, with an optional `.env` file
//! loaded first. Environment variables take precedence over `.env`.

use std::time::Duration;

use telepoll_client::UpdateKind;

/// Runtime configuration for the bot process.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Bot API token (`TELEGRAM_BOT_TOKEN`, required).
    pub token: String,

    /// Tracing filter directive (`LOG_LEVEL`, default `info`).
    pub log_filter: String,

    /// Minimum spacing between fetch calls (`POLL_INTERVAL_MS`).
    pub poll_interval: Duration,

    /// Long-poll timeout (`POLL_TIMEOUT_SECS`).
    pub timeout: Duration,

    /// Maximum retry attempts per failure streak (`MAX_RETRIES`).
    pub max_retries: u32,

    /// Comma-separated update categories (`ALLOWED_UPDATES`); empty
    /// means all.
    pub allowed_updates: Vec<UpdateKind>,
}

impl BotConfig {
    /// Read configuration from the environment and an optional `.env`
    /// file.
    pub fn from_env() -> Self {
        // Missing .env is fine.
        let _ = dotenvy::dotenv();

        Self {
            token: std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            log_filter: env_or("LOG_LEVEL", "info"),
            poll_interval: Duration::from_millis(env_parse("POLL_INTERVAL_MS", 100)),
            timeout: Duration::from_secs(env_parse("POLL_TIMEOUT_SECS", 30)),
            max_retries: env_parse("MAX_RETRIES", 3),
            allowed_updates: UpdateKind::parse_list(
                &std::env::var("ALLOWED_UPDATES").unwrap_or_default(),
            ),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
