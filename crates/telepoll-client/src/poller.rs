//! The long-polling engine.
//!
//! A [`Poller`] owns the offset cursor, the start/stop lifecycle and the
//! fetch loop. The loop runs as an independent tokio task, pushes updates
//! onto a bounded queue in server order, and advances the offset only
//! after each successful enqueue - delivery is therefore at-least-once
//! and in order, never exactly-once.
//!
//! Two cancellation channels are honored at every suspension point: a
//! caller-supplied [`CancellationToken`] and the internal stop signal
//! raised by [`Poller::stop`]. All fetch-level failures are handled
//! inside the loop by the retry policy; the caller only ever sees
//! construction, `start` and probe errors.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::api::decode_response;
use crate::config::PollerConfig;
use crate::error::{ClientError, Result};
use crate::transport::{HttpTransport, Transport};
use crate::types::{Update, UpdateKind, User};

/// Callback contract for the dispatch adapter.
///
/// A handler failure is logged and does not stop the drain loop or the
/// engine; the update was already acknowledged when the handler ran.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, cancel: CancellationToken, update: Update) -> anyhow::Result<()>;
}

/// Long-polling client for the Bot API update stream.
pub struct Poller {
    config: PollerConfig,
    transport: Arc<dyn Transport>,
    offset: Arc<AtomicI64>,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
    updates_tx: Mutex<Option<mpsc::Sender<Update>>>,
    updates_rx: Mutex<Option<mpsc::Receiver<Update>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    /// Validate the configuration and create a poller in the stopped
    /// state.
    pub fn new(mut config: PollerConfig) -> Result<Self> {
        config.validate()?;

        let transport: Arc<dyn Transport> = match config.transport.clone() {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(config.timeout)?),
        };

        let (updates_tx, updates_rx) = mpsc::channel(config.channel_capacity);
        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            transport,
            offset: Arc::new(AtomicI64::new(0)),
            running: AtomicBool::new(false),
            stop_tx,
            updates_tx: Mutex::new(Some(updates_tx)),
            updates_rx: Mutex::new(Some(updates_rx)),
            loop_handle: Mutex::new(None),
        })
    }

    /// Take the consuming end of the updates queue.
    ///
    /// The receiver can only be handed out once; subsequent calls return
    /// `None`. The queue is closed (drain returns `None`) only after a
    /// completed [`stop`](Self::stop).
    pub fn take_updates(&self) -> Option<mpsc::Receiver<Update>> {
        self.updates_rx.lock().take()
    }

    /// Spawn the fetch loop.
    ///
    /// Fails with [`ClientError::AlreadyRunning`] if the loop is already
    /// up; the rejected call does not spawn a duplicate loop.
    pub fn start(&self, cancel: CancellationToken) -> Result<()> {
        if *self.stop_tx.borrow() {
            return Err(ClientError::AlreadyStopped);
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::AlreadyRunning);
        }

        let Some(updates) = self.updates_tx.lock().clone() else {
            self.running.store(false, Ordering::SeqCst);
            return Err(ClientError::AlreadyStopped);
        };

        let poll_loop = PollLoop {
            config: self.config.clone(),
            transport: self.transport.clone(),
            offset: self.offset.clone(),
            updates,
            stop_rx: self.stop_tx.subscribe(),
            cancel,
        };

        *self.loop_handle.lock() = Some(tokio::spawn(poll_loop.run()));

        info!(
            timeout_secs = self.config.timeout.as_secs(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "poller started"
        );

        Ok(())
    }

    /// Start the engine and pump every delivered update through the
    /// given handler on a separate task, in delivery order.
    pub fn start_with_handler(
        &self,
        cancel: CancellationToken,
        handler: Arc<dyn UpdateHandler>,
    ) -> Result<()> {
        let Some(mut updates) = self.take_updates() else {
            return Err(ClientError::ReceiverTaken);
        };

        if let Err(err) = self.start(cancel.clone()) {
            *self.updates_rx.lock() = Some(updates);
            return Err(err);
        }

        tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                let update_id = update.update_id;
                if let Err(err) = handler.handle(cancel.clone(), update).await {
                    error!(error = %err, update_id, "update handler failed");
                }
            }
            debug!("updates queue closed, dispatch task exiting");
        });

        Ok(())
    }

    /// Gracefully shut down the fetch loop.
    ///
    /// Blocks until the loop task has fully exited, then closes the
    /// updates queue. Idempotent: a second call, or a call before
    /// `start`, is a no-op.
    pub async fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.stop_tx.send_replace(true);

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "poll loop task failed");
            }
        }

        // Dropping the retained sender closes the queue once the loop's
        // clone is gone, signaling "no more updates" to the consumer.
        self.updates_tx.lock().take();

        info!("poller stopped");
    }

    /// Whether the fetch loop has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The current offset cursor: one past the highest acknowledged
    /// update sequence number.
    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::SeqCst)
    }

    /// Set the offset cursor, e.g. to resume from a persisted value.
    pub fn set_offset(&self, offset: i64) {
        self.offset.store(offset, Ordering::SeqCst);
    }

    /// One-shot identity probe: validates the credential and returns the
    /// bot's own identity record.
    ///
    /// Not part of the loop's retry machinery; any failure is surfaced
    /// directly.
    pub async fn get_me(&self) -> Result<User> {
        let url = method_url(&self.config.base_url, &self.config.token, "getMe")?;
        let body = self.transport.get(url).await?;
        decode_response(&body)
    }
}

/// State moved into the fetch loop task.
struct PollLoop {
    config: PollerConfig,
    transport: Arc<dyn Transport>,
    offset: Arc<AtomicI64>,
    updates: mpsc::Sender<Update>,
    stop_rx: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl PollLoop {
    async fn run(mut self) {
        let mut retry_count: u32 = 0;
        let start = tokio::time::Instant::now() + self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(start, self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("polling stopped: cancellation requested");
                    return;
                }
                _ = self.stop_rx.changed() => {
                    debug!("polling stopped: stop signal");
                    return;
                }
                _ = ticker.tick() => {
                    let updates = match self.get_updates().await {
                        Ok(updates) => updates,
                        Err(err) => {
                            if self.handle_error(err, &mut retry_count).await {
                                continue;
                            }
                            return;
                        }
                    };

                    retry_count = 0;
                    self.config.backoff.reset();

                    for update in updates {
                        let update_id = update.update_id;
                        tokio::select! {
                            _ = self.cancel.cancelled() => return,
                            _ = self.stop_rx.changed() => return,
                            sent = self.updates.send(update) => {
                                if sent.is_err() {
                                    warn!("updates receiver dropped, stopping poll loop");
                                    return;
                                }
                                // Acknowledge only what the consumer could
                                // have observed.
                                self.offset.store(update_id + 1, Ordering::SeqCst);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Classify a fetch failure and wait out the retry delay.
    ///
    /// Returns true if polling should continue, false if the loop must
    /// exit. A non-retryable API error aborts immediately without
    /// consuming retry budget.
    async fn handle_error(&mut self, err: ClientError, retry_count: &mut u32) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        error!(error = %err, retry_count = *retry_count, "failed to get updates");

        if *retry_count >= self.config.max_retries {
            error!(
                max_retries = self.config.max_retries,
                "max retries exceeded, stopping poller"
            );
            return false;
        }

        let backoff = match &err {
            ClientError::Api(api_err) => match api_err.retry_after {
                // Honor the server-mandated wait exactly.
                Some(after) => after,
                None if !api_err.is_retryable() => {
                    error!(
                        error_code = api_err.code,
                        "non-retryable api error, stopping poller"
                    );
                    return false;
                }
                None => self.config.backoff.next_backoff(*retry_count),
            },
            _ => self.config.backoff.next_backoff(*retry_count),
        };

        info!(
            backoff_ms = backoff.as_millis() as u64,
            attempt = *retry_count + 1,
            "retrying after backoff"
        );

        *retry_count += 1;

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = self.stop_rx.changed() => false,
            _ = tokio::time::sleep(backoff) => true,
        }
    }

    /// Issue one long-poll fetch and decode the result batch.
    async fn get_updates(&self) -> Result<Vec<Update>> {
        let mut url = method_url(&self.config.base_url, &self.config.token, "getUpdates")?;
        let offset = self.offset.load(Ordering::SeqCst);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeout", &self.config.timeout.as_secs().to_string());

            if offset > 0 {
                query.append_pair("offset", &offset.to_string());
            }

            if !self.config.allowed_updates.is_empty() {
                let names: Vec<&str> = self
                    .config
                    .allowed_updates
                    .iter()
                    .map(UpdateKind::as_str)
                    .collect();
                query.append_pair("allowed_updates", &serde_json::to_string(&names)?);
            }
        }

        debug!(
            offset,
            timeout_secs = self.config.timeout.as_secs(),
            "polling for updates"
        );

        let body = self.transport.get(url).await?;
        let updates: Vec<Update> = decode_response(&body)?;

        if !updates.is_empty() {
            debug!(
                count = updates.len(),
                first_id = updates[0].update_id,
                last_id = updates[updates.len() - 1].update_id,
                "received updates"
            );
        }

        Ok(updates)
    }
}

fn method_url(base_url: &str, token: &str, method: &str) -> Result<Url> {
    Ok(Url::parse(&format!("{base_url}/bot{token}/{method}"))?)
}
