//! Relay transports and the bridge that turns relay traffic into updates.
//!
//! - [`Relay`]: the raw relay surface (send, poll, push subscription)
//! - [`bridge`]: session filtering and decoding ([`TransportBridge`])
//! - [`listener`]: the isolated push-listener task
//! - [`http`], [`cli`], [`loopback`]: relay implementations

pub mod bridge;
pub mod cli;
pub mod http;
pub mod listener;
pub mod loopback;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use relay_proto::EventRecord;

use crate::config::{RelayConfig, RelayKind};
use crate::error::RelayError;

pub use bridge::{DecodedUpdate, Session, TransportBridge};
pub use listener::ListenerHandle;

/// Live feed of event records from a push-capable relay.
pub type RecordStream = BoxStream<'static, Result<EventRecord, RelayError>>;

/// A group-messaging relay.
///
/// Implementations hand back raw event records; filtering and decoding
/// happen in the [`TransportBridge`] so that every relay is held to the
/// same rules.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Post `message` to `group_id` as `account`.
    async fn send(&self, account: &str, group_id: &str, message: &str) -> Result<(), RelayError>;

    /// One poll of `account`'s inbox.
    async fn receive(
        &self,
        account: &str,
        max_messages: u32,
        timeout: Duration,
    ) -> Result<Vec<EventRecord>, RelayError>;

    /// Subscribe to pushed records, for one account or all of them.
    async fn subscribe(&self, _account: Option<&str>) -> Result<RecordStream, RelayError> {
        Err(RelayError::Unsupported("subscribe"))
    }
}

/// Build the relay selected by the configuration.
pub fn connect(config: &RelayConfig) -> Result<Arc<dyn Relay>, RelayError> {
    Ok(match config.kind {
        RelayKind::Http => Arc::new(http::HttpRelay::new(&config.url)?),
        RelayKind::Cli => Arc::new(cli::CliRelay::new(
            &config.cli_path,
            config.cli_config_dir.as_deref(),
        )),
        RelayKind::Loopback => Arc::new(loopback::LoopbackRelay::new(
            config.loopback.clone(),
            [config.sender_account.as_str(), config.receiver_account.as_str()],
        )),
    })
}
