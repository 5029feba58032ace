//! Chat pipeline: handler → publisher task → relay → fan-out task.
//!
//! ```text
//! receive loop ─ dispatch ─→ chat handler ─(mpsc)─→ publisher ─→ relay.publish
//!                                                                    │
//! every session ←─ Broadcaster ←─ fan-out ←─(subscription)───────────┘
//! ```
//!
//! Chat always takes the relay round trip so that every instance
//! broadcasts the same messages. The only shortcut is the local fallback
//! for when publishing fails.

use std::sync::Arc;

use relaycast_protocol::{ChatMessage, Codec, SystemMessage};
use relaycast_relay::{Relay, RetryPolicy, Subscription};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::dispatch::PacketContext;
use crate::fanout::Broadcaster;

/// Capacity of the hand-off queue between chat handlers and the publisher.
pub const PUBLISH_QUEUE_LEN: usize = 1024;

/// Builds the chat handler.
///
/// The handler stamps the message with the sender's session id (whatever
/// the client put in `sender_id` is discarded) and queues it for the
/// publisher. A full queue drops the message.
pub fn chat_handler(
    publish_tx: mpsc::Sender<ChatMessage>,
) -> impl Fn(&PacketContext, ChatMessage) + Send + Sync + 'static {
    move |ctx: &PacketContext, mut msg: ChatMessage| {
        msg.sender_id = ctx.session_id;
        match publish_tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(session_id = %ctx.session_id, "publish queue full, dropping chat message");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(session_id = %ctx.session_id, "publisher stopped, dropping chat message");
            }
        }
    }
}

/// Builds the handler for client-sent system messages, which are
/// server-only and get dropped.
pub fn system_handler() -> impl Fn(&PacketContext, SystemMessage) + Send + Sync + 'static {
    |ctx: &PacketContext, _msg: SystemMessage| {
        tracing::debug!(session_id = %ctx.session_id, "ignoring client-originated system message");
    }
}

/// Settings shared by the publisher task.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub channel: String,
    pub local_fallback: bool,
}

/// Publishes queued chat messages to the relay until the queue closes.
///
/// When a publish fails and `local_fallback` is set, the message is
/// broadcast to this instance's sessions instead, so chat keeps working
/// within the process during a relay outage.
pub async fn run_publisher<R, C>(
    relay: Arc<R>,
    broadcaster: Broadcaster<C>,
    codec: C,
    options: PublishOptions,
    mut rx: mpsc::Receiver<ChatMessage>,
) where
    R: Relay,
    C: Codec,
{
    while let Some(msg) = rx.recv().await {
        let sender = msg.sender_id;
        let envelope = match codec.wrap(&msg) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(session_id = %sender, error = %e, "failed to encode chat message");
                continue;
            }
        };
        let payload = match codec.encode(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(session_id = %sender, error = %e, "failed to encode chat envelope");
                continue;
            }
        };

        let Err(e) = relay.publish(&options.channel, &payload).await else {
            continue;
        };
        tracing::warn!(
            channel = %options.channel,
            session_id = %sender,
            error = %e,
            local_fallback = options.local_fallback,
            "relay publish failed"
        );
        if options.local_fallback {
            if let Err(e) = broadcaster.broadcast(&envelope).await {
                tracing::warn!(error = %e, "local fallback broadcast failed");
            }
        }
    }
    tracing::debug!("chat publisher stopped");
}

/// Broadcasts everything arriving on the relay subscription until it ends.
pub async fn run_relay_fanout<C>(mut subscription: Subscription, broadcaster: Broadcaster<C>, codec: C)
where
    C: Codec,
{
    while let Some(payload) = subscription.recv().await {
        let envelope = match codec.decode_envelope(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    channel = %subscription.channel(),
                    error = %e,
                    "dropping malformed relay payload"
                );
                continue;
            }
        };
        match broadcaster.broadcast(&envelope).await {
            Ok(report) => {
                tracing::trace!(delivered = report.delivered, "relayed message broadcast");
            }
            Err(e) => tracing::warn!(error = %e, "relay broadcast failed"),
        }
    }
    tracing::debug!(channel = %subscription.channel(), "relay subscription ended");
}

/// Keeps a subscription to `channel` open for as long as the task runs and
/// broadcasts everything that arrives on it.
///
/// Failed subscribe attempts back off with `retry`. A subscription that
/// ends is re-established the same way, starting over from the shortest
/// delay.
pub async fn run_relay_subscriber<R, C>(
    relay: Arc<R>,
    channel: String,
    retry: RetryPolicy,
    broadcaster: Broadcaster<C>,
    codec: C,
) where
    R: Relay,
    C: Codec + Clone,
{
    let mut attempt = 0u32;
    loop {
        match relay.subscribe(&channel).await {
            Ok(subscription) => {
                attempt = 0;
                tracing::info!(%channel, "subscribed to relay channel");
                run_relay_fanout(subscription, broadcaster.clone(), codec.clone()).await;
            }
            Err(e) => {
                tracing::warn!(
                    %channel,
                    error = %e,
                    "relay subscribe failed, chat will not reach other instances"
                );
            }
        }
        let delay = retry.delay_for(attempt);
        attempt = attempt.saturating_add(1);
        tracing::debug!(%channel, retry_in_ms = delay.as_millis() as u64, "resubscribing to relay");
        tokio::time::sleep(delay).await;
    }
}
