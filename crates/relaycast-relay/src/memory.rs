//! In-process relay built on a `tokio::sync::broadcast` channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use crate::{Relay, RelayError, Subscription, SUBSCRIPTION_BUFFER};

/// A [`Relay`] that never leaves the process.
///
/// Every subscriber of a channel receives every payload published on it
/// after it subscribed. Clones share the same underlying channel, so a
/// clone can be handed to a server while a test keeps another.
///
/// The relay can be switched offline with [`set_online`](Self::set_online)
/// to exercise outage handling: while offline, `publish` and `subscribe`
/// fail with [`RelayError::Unavailable`].
#[derive(Clone)]
pub struct MemoryRelay {
    inner: Arc<Inner>,
}

struct Inner {
    tx: broadcast::Sender<(String, Arc<[u8]>)>,
    online: AtomicBool,
}

impl MemoryRelay {
    /// Creates a relay that buffers up to 1024 undelivered payloads per
    /// subscriber.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Creates a relay with a custom per-subscriber buffer.
    ///
    /// A subscriber that falls more than `capacity` payloads behind skips
    /// the oldest ones (logged as lag).
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                tx,
                online: AtomicBool::new(true),
            }),
        }
    }

    /// Marks the relay reachable or unreachable.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    /// Returns whether the relay is currently reachable.
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<(), RelayError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(RelayError::Unavailable("memory relay is offline".into()))
        }
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay for MemoryRelay {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), RelayError> {
        self.ensure_online()?;
        // `send` only fails when nobody is subscribed, which is fine for a
        // best-effort relay.
        let _ = self.inner.tx.send((channel.to_string(), Arc::from(payload)));
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, RelayError> {
        self.ensure_online()?;

        let mut source = self.inner.tx.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let wanted = channel.to_string();

        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok((published_on, payload)) => {
                        if published_on != wanted {
                            continue;
                        }
                        if tx.send(payload.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(channel = %wanted, skipped, "memory relay subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::trace!(channel = %wanted, "memory relay delivery task finished");
        });

        Ok(Subscription::new(channel, rx))
    }
}
