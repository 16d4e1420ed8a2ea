//! Long-polling client for the Telegram Bot API.
//!
//! The crate is built around [`Poller`]: it repeatedly fetches batches of
//! ordered updates, acknowledges consumption through an offset cursor and
//! delivers every update to a consumer at least once, in order, while
//! surviving transient network and server failures on its own.
//!
//! ```no_run
//! use std::sync::Arc;
//! use telepoll_client::{Poller, PollerConfig, Update, UpdateHandler};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl UpdateHandler for Echo {
//!     async fn handle(
//!         &self,
//!         _cancel: CancellationToken,
//!         update: Update,
//!     ) -> anyhow::Result<()> {
//!         println!("update {}", update.update_id);
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let poller = Poller::new(PollerConfig::new("bot-token"))?;
//! let me = poller.get_me().await?;
//! println!("authenticated as {}", me.first_name);
//!
//! let cancel = CancellationToken::new();
//! poller.start_with_handler(cancel.clone(), Arc::new(Echo))?;
//! // ... later
//! poller.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backoff;
pub mod config;
pub mod error;
pub mod poller;
pub mod transport;
pub mod types;

// Re-export main types
pub use api::{ApiError, ApiResponse, ResponseParameters};
pub use backoff::{BackoffStrategy, ExponentialBackoff};
pub use config::PollerConfig;
pub use error::{ClientError, Result};
pub use poller::{Poller, UpdateHandler};
pub use transport::{HttpTransport, Transport, TransportError};
pub use types::{Update, UpdateKind, User};
