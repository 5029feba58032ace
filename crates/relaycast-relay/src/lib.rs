//! Publish/subscribe relay for Relaycast.
//!
//! Several Relaycast processes stay in sync by publishing every chat
//! message to a shared channel on a relay and broadcasting whatever comes
//! back from it. This crate defines the [`Relay`] contract and two
//! implementations:
//!
//! - [`MemoryRelay`] — in-process, for single-instance deployments and tests.
//! - [`RedisRelay`] — a Redis `PUBLISH`/`SUBSCRIBE` adapter on the `redis` crate.
//!
//! Delivery is best-effort: a publish may be lost while the relay is down,
//! and a subscriber may see duplicates after a reconnect.

mod error;
mod memory;
mod redis;

pub use error::RelayError;
pub use memory::MemoryRelay;
pub use redis::{RedisRelay, RetryPolicy};

use std::future::Future;

use tokio::sync::mpsc;

/// Default channel all Relaycast instances share.
pub const DEFAULT_CHANNEL: &str = "GlobalChat";

/// Buffer between a relay's delivery task and the subscription consumer.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 1024;

/// A publish/subscribe channel shared by server processes.
///
/// The futures are `Send` so that callers can drive a relay from spawned
/// tasks without knowing the concrete type.
pub trait Relay: Send + Sync + 'static {
    /// Publishes `payload` on `channel`. No delivery acknowledgment.
    ///
    /// # Errors
    /// [`RelayError::Unavailable`] if the relay can't be reached.
    fn publish(
        &self,
        channel: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Subscribes to `channel`.
    ///
    /// Each published payload is delivered through the returned
    /// [`Subscription`]. Implementations run delivery on their own task
    /// and only forward bytes into the subscription's channel.
    fn subscribe(
        &self,
        channel: &str,
    ) -> impl Future<Output = Result<Subscription, RelayError>> + Send;
}

/// The receiving end of a relay subscription.
///
/// Dropping it ends the subscription; the relay's delivery task notices
/// on its next send and stops.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Subscription {
    /// Wraps the receiving end of a delivery channel.
    pub fn new(channel: impl Into<String>, rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            rx,
        }
    }

    /// The channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the next published payload.
    ///
    /// Returns `None` once the relay side has shut the subscription down.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}
