//! Redis relay adapter, built on the `redis` crate.
//!
//! A pub/sub connection can't run other commands, so publishing and
//! subscribing use separate connections:
//!
//! - Publishing shares one multiplexed connection, opened on first use and
//!   dropped when it fails or stops answering; the next publish reopens it.
//! - Each subscription owns a background task that connects, subscribes and
//!   forwards pushed messages. When the connection is lost the task
//!   reconnects after a backoff taken from [`RetryPolicy`].
//!
//! Every network step is bounded by a timeout, so a stalled Redis shows up
//! as [`RelayError::Unavailable`] instead of a hung publisher.

use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::{Client, Value};
use tokio::sync::{Mutex, mpsc};

use crate::{Relay, RelayError, SUBSCRIPTION_BUFFER, Subscription};

/// Backoff between reconnection attempts.
///
/// Attempt `n` (starting at 0) waits `initial_delay * 2^n`, capped at
/// `max_delay`, plus up to `jitter` of that again at random.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay added as random jitter, in `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay before reconnection attempt number `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        let base = self.initial_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter <= 0.0 {
            return base;
        }
        let spread = base.mul_f64(self.jitter.min(1.0));
        base + spread.mul_f64(rand::rng().random::<f64>())
    }
}

/// A [`Relay`] backed by a Redis server.
///
/// ```no_run
/// use relaycast_relay::{RedisRelay, Relay};
///
/// # async fn demo() -> Result<(), relaycast_relay::RelayError> {
/// let relay = RedisRelay::open("redis://127.0.0.1:6379")?;
/// relay.ping().await?;
/// relay.publish("GlobalChat", b"hello").await?;
/// # Ok(())
/// # }
/// ```
pub struct RedisRelay {
    client: Client,
    url: String,
    publisher: Mutex<Option<MultiplexedConnection>>,
    retry: RetryPolicy,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl RedisRelay {
    /// Creates a relay for `url` (`host:port` or `redis://host:port[/db]`).
    ///
    /// Nothing is dialed until the first command.
    ///
    /// # Errors
    /// [`RelayError::Protocol`] if `url` isn't a valid Redis address.
    pub fn open(url: &str) -> Result<Self, RelayError> {
        let url = if url.contains("://") {
            url.to_string()
        } else {
            format!("redis://{url}")
        };
        let client = Client::open(url.as_str())?;
        Ok(Self {
            client,
            url,
            publisher: Mutex::new(None),
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
        })
    }

    /// Replaces the backoff used by subscription reconnects.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets how long opening a connection may take.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets how long a single command may wait for its reply.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// The Redis URL this relay connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Checks that the relay answers.
    pub async fn ping(&self) -> Result<(), RelayError> {
        match self.command(&redis::cmd("PING")).await? {
            Value::SimpleString(_) | Value::BulkString(_) | Value::Okay => Ok(()),
            other => Err(RelayError::Protocol(format!(
                "unexpected reply to PING: {other:?}"
            ))),
        }
    }

    /// Returns the shared publish connection, opening it if needed.
    async fn publisher(&self) -> Result<MultiplexedConnection, RelayError> {
        let mut slot = self.publisher.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| RelayError::Unavailable(format!("connecting to {} timed out", self.url)))??;
        tracing::debug!(url = %self.url, "relay publish connection established");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Runs one command on the publish connection.
    ///
    /// The connection is dropped when the command fails for any reason
    /// other than Redis rejecting it.
    async fn command(&self, cmd: &redis::Cmd) -> Result<Value, RelayError> {
        let mut conn = self.publisher().await?;
        let reply = match tokio::time::timeout(self.command_timeout, conn.req_packed_command(cmd)).await
        {
            Ok(reply) => reply.map_err(RelayError::from),
            Err(_) => Err(RelayError::Unavailable(format!(
                "no reply from {} within {:?}",
                self.url, self.command_timeout
            ))),
        };
        if let Err(RelayError::Unavailable(e)) = &reply {
            tracing::debug!(url = %self.url, error = %e, "dropping relay publish connection");
            *self.publisher.lock().await = None;
        }
        reply
    }
}

impl std::fmt::Debug for RedisRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRelay")
            .field("url", &self.url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Relay for RedisRelay {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), RelayError> {
        let mut cmd = redis::cmd("PUBLISH");
        cmd.arg(channel).arg(payload);
        match self.command(&cmd).await? {
            Value::Int(receivers) => {
                tracing::trace!(%channel, receivers, "published to relay");
                Ok(())
            }
            other => Err(RelayError::Protocol(format!(
                "unexpected reply to PUBLISH: {other:?}"
            ))),
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, RelayError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task = SubscriptionTask {
            client: self.client.clone(),
            url: self.url.clone(),
            channel: channel.to_string(),
            retry: self.retry.clone(),
            connect_timeout: self.connect_timeout,
            tx,
        };
        tokio::spawn(task.run());
        Ok(Subscription::new(channel, rx))
    }
}

/// Background state for one Redis subscription.
struct SubscriptionTask {
    client: Client,
    url: String,
    channel: String,
    retry: RetryPolicy,
    connect_timeout: Duration,
    tx: mpsc::Sender<Vec<u8>>,
}

impl SubscriptionTask {
    /// Keeps the subscription alive until the consumer drops it.
    async fn run(self) {
        let mut attempt = 0u32;
        loop {
            match self.stream_messages(&mut attempt).await {
                Ok(()) => break,
                Err(e) => {
                    let delay = self.retry.delay_for(attempt);
                    attempt = attempt.saturating_add(1);
                    tracing::warn!(
                        url = %self.url,
                        channel = %self.channel,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "relay subscription lost, reconnecting"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.tx.closed() => break,
                    }
                }
            }
        }
        tracing::debug!(channel = %self.channel, "relay subscription task finished");
    }

    /// Connects, subscribes and forwards messages.
    ///
    /// Returns `Ok` when the consumer is gone and `Err` when the connection
    /// needs to be re-established.
    async fn stream_messages(&self, attempt: &mut u32) -> Result<(), RelayError> {
        let subscribe = async {
            let mut pubsub = self.client.get_async_pubsub().await?;
            pubsub.subscribe(self.channel.as_str()).await?;
            Ok::<_, RelayError>(pubsub)
        };
        let mut pubsub = tokio::time::timeout(self.connect_timeout, subscribe)
            .await
            .map_err(|_| RelayError::Unavailable(format!("subscribing via {} timed out", self.url)))??;
        *attempt = 0;
        tracing::info!(url = %self.url, channel = %self.channel, "subscribed to relay channel");

        let messages = pubsub.on_message();
        tokio::pin!(messages);
        loop {
            tokio::select! {
                msg = messages.next() => match msg {
                    Some(msg) => {
                        if self.tx.send(msg.get_payload_bytes().to_vec()).await.is_err() {
                            return Ok(());
                        }
                    }
                    None => {
                        return Err(RelayError::Unavailable("relay closed the subscription".into()));
                    }
                },
                _ = self.tx.closed() => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_delay_for_doubles_from_initial() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    }

    #[test]
    fn test_delay_for_caps_at_max() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_for_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_open_adds_missing_scheme() {
        assert_eq!(
            RedisRelay::open("redis://10.0.0.1:6379").unwrap().url(),
            "redis://10.0.0.1:6379"
        );
        assert_eq!(
            RedisRelay::open("127.0.0.1:6379").unwrap().url(),
            "redis://127.0.0.1:6379"
        );
    }

    #[test]
    fn test_open_rejects_unknown_scheme() {
        assert!(matches!(
            RedisRelay::open("http://127.0.0.1:6379"),
            Err(RelayError::Protocol(_))
        ));
    }
}
