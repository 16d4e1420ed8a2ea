mod config;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use telepoll_client::{Poller, PollerConfig, Update, UpdateHandler, UpdateKind};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::BotConfig;

/// Logs every delivered update; stands in for real business logic.
struct LogHandler;

#[async_trait]
impl UpdateHandler for LogHandler {
    async fn handle(&self, _cancel: CancellationToken, update: Update) -> Result<()> {
        match update.kind() {
            Some(UpdateKind::Message) => {
                let text = update.payload["message"]
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or("<no text>");
                info!(update_id = update.update_id, text, "message received");
            }
            Some(kind) => {
                info!(update_id = update.update_id, kind = %kind, "update received");
            }
            None => {
                info!(update_id = update.update_id, "update with unknown payload");
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = BotConfig::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.token.is_empty() {
        bail!("TELEGRAM_BOT_TOKEN is required; set it in the environment or a .env file");
    }

    let poller = Poller::new(
        PollerConfig::new(config.token.clone())
            .with_poll_interval(config.poll_interval)
            .with_timeout(config.timeout)
            .with_max_retries(config.max_retries)
            .with_allowed_updates(config.allowed_updates.clone()),
    )
    .context("failed to create poller")?;

    // Fail fast on a bad credential before entering the loop.
    let me = poller.get_me().await.context("identity probe failed")?;
    info!(
        id = me.id,
        username = me.username.as_deref().unwrap_or(""),
        name = %me.first_name,
        "bot connected"
    );

    let cancel = CancellationToken::new();
    poller.start_with_handler(cancel.clone(), Arc::new(LogHandler))?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    cancel.cancel();
    poller.stop().await;

    info!("bot shutdown complete");
    Ok(())
}
