//! `RelaycastServer` builder and server loop.
//!
//! This is the entry point for running a Relaycast server. It ties
//! together all the layers: transport → protocol → session → dispatch,
//! plus the relay publisher and fan-out tasks.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relaycast_protocol::{ChatMessage, Codec, JsonCodec, SystemMessage};
use relaycast_relay::{Relay, RetryPolicy};
use relaycast_session::{SessionConfig, SessionTable};
use relaycast_transport::{TcpTransport, Transport};
use tokio::sync::{mpsc, watch};

use crate::RelaycastError;
use crate::chat::{
    PUBLISH_QUEUE_LEN, PublishOptions, chat_handler, run_publisher, run_relay_subscriber,
    system_handler,
};
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::fanout::{BroadcastReport, Broadcaster};
use crate::handler::handle_connection;

/// Notice broadcast to local sessions right before the server stops.
pub const SHUTDOWN_NOTICE: &str = "server is shutting down";

/// Per-connection settings read by every handler task.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionSettings {
    pub(crate) max_frame_len: usize,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) greeting: Option<String>,
}

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// dispatcher is read-only once the server is built.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) sessions: Arc<SessionTable>,
    pub(crate) dispatcher: Dispatcher<C>,
    pub(crate) broadcaster: Broadcaster<C>,
    pub(crate) settings: ConnectionSettings,
    pub(crate) shutdown: watch::Receiver<bool>,
}

/// Builder for configuring and starting a Relaycast server.
///
/// # Example
///
/// ```rust,no_run
/// use relaycast::prelude::*;
///
/// # async fn demo() -> Result<(), RelaycastError> {
/// let server = RelaycastServerBuilder::new()
///     .bind("0.0.0.0:3000")
///     .greeting("welcome!")
///     .build(MemoryRelay::new())
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct RelaycastServerBuilder {
    bind_addr: String,
    channel: String,
    max_frame_len: usize,
    idle_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    greeting: Option<String>,
    local_fallback: bool,
    relay_retry: RetryPolicy,
}

impl RelaycastServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(&ServerConfig::default())
    }

    /// Creates a builder from a loaded configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            bind_addr: config.bind_addr(),
            channel: config.channel.clone(),
            max_frame_len: config.max_frame_len,
            idle_timeout: config.idle_timeout(),
            write_timeout: config.write_timeout(),
            greeting: config.greeting.clone(),
            local_fallback: config.local_fallback,
            relay_retry: RetryPolicy::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the relay channel shared with other instances.
    pub fn channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self
    }

    /// Sets the largest accepted frame body.
    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Sets how long a connection may go without a complete frame.
    /// `None` disables the timeout.
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the per-frame write timeout. `None` disables it.
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sends `text` as a system message to every new connection.
    pub fn greeting(mut self, text: impl Into<String>) -> Self {
        self.greeting = Some(text.into());
        self
    }

    /// Broadcast locally when publishing to the relay fails.
    pub fn local_fallback(mut self, enabled: bool) -> Self {
        self.local_fallback = enabled;
        self
    }

    /// Sets the backoff between relay subscribe attempts.
    pub fn relay_retry(mut self, retry: RetryPolicy) -> Self {
        self.relay_retry = retry;
        self
    }

    /// Binds the listener and wires up the chat pipeline.
    ///
    /// Uses `JsonCodec` and `TcpTransport`. The relay isn't contacted
    /// here: the subscription is made (and retried) once the server runs.
    ///
    /// # Errors
    /// Only a bind failure.
    pub async fn build<R: Relay>(self, relay: R) -> Result<RelaycastServer<R>, RelaycastError> {
        let transport = TcpTransport::bind(&self.bind_addr).await?;
        let codec = JsonCodec;
        let relay = Arc::new(relay);

        let sessions = Arc::new(SessionTable::new(SessionConfig {
            write_timeout: self.write_timeout,
        }));
        let broadcaster = Broadcaster::new(Arc::clone(&sessions), codec);

        let (publish_tx, publish_rx) = mpsc::channel(PUBLISH_QUEUE_LEN);
        let mut dispatcher = Dispatcher::new(codec);
        dispatcher
            .register(chat_handler(publish_tx))
            .register(system_handler());
        for packet_type in dispatcher.missing_handlers() {
            tracing::warn!(%packet_type, "no handler registered for packet type");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(ServerState {
            sessions,
            dispatcher,
            broadcaster,
            settings: ConnectionSettings {
                max_frame_len: self.max_frame_len,
                idle_timeout: self.idle_timeout,
                greeting: self.greeting,
            },
            shutdown: shutdown_rx,
        });

        Ok(RelaycastServer {
            transport,
            state,
            relay,
            publish_rx,
            relay_retry: self.relay_retry,
            publish_options: PublishOptions {
                channel: self.channel,
                local_fallback: self.local_fallback,
            },
            shutdown_tx,
        })
    }
}

impl Default for RelaycastServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Relaycast server, bound and ready to accept.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct RelaycastServer<R: Relay, C: Codec = JsonCodec> {
    transport: TcpTransport,
    state: Arc<ServerState<C>>,
    relay: Arc<R>,
    publish_rx: mpsc::Receiver<ChatMessage>,
    relay_retry: RetryPolicy,
    publish_options: PublishOptions,
    shutdown_tx: watch::Sender<bool>,
}

impl<R, C> RelaycastServer<R, C>
where
    R: Relay,
    C: Codec + Clone,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, RelaycastError> {
        Ok(self.transport.local_addr()?)
    }

    /// The live session table.
    pub fn sessions(&self) -> Arc<SessionTable> {
        Arc::clone(&self.state.sessions)
    }

    /// A broadcaster writing to this server's sessions.
    pub fn broadcaster(&self) -> Broadcaster<C> {
        self.state.broadcaster.clone()
    }

    /// The relay this server publishes to.
    pub fn relay(&self) -> &Arc<R> {
        &self.relay
    }

    /// Broadcasts a system notice to this instance's sessions.
    ///
    /// Notices are local: they don't go through the relay.
    pub async fn announce(&self, text: &str) -> Result<BroadcastReport, RelaycastError> {
        announce(&self.state, text).await
    }

    /// Runs the server until the process is terminated.
    pub async fn run(self) -> Result<(), RelaycastError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Spawns the relay publisher and subscriber tasks, then a handler task
    /// for every accepted connection. Accept errors are logged and the loop
    /// continues. On shutdown the local sessions get a notice, every
    /// connection is closed and the background tasks stop.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), RelaycastError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            mut transport,
            state,
            relay,
            publish_rx,
            relay_retry,
            publish_options,
            shutdown_tx,
        } = self;
        let codec = state.dispatcher.codec().clone();

        let subscriber = tokio::spawn(run_relay_subscriber(
            Arc::clone(&relay),
            publish_options.channel.clone(),
            relay_retry,
            state.broadcaster.clone(),
            codec.clone(),
        ));
        let publisher = tokio::spawn(run_publisher(
            relay,
            state.broadcaster.clone(),
            codec,
            publish_options,
            publish_rx,
        ));

        match transport.local_addr() {
            Ok(addr) => tracing::info!(%addr, "Relaycast server running"),
            Err(e) => tracing::info!(error = %e, "Relaycast server running"),
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(handle_connection(conn, state));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        let live = state.sessions.len().await;
        tracing::info!(sessions = live, "Relaycast server shutting down");
        if let Err(e) = announce(&state, SHUTDOWN_NOTICE).await {
            tracing::debug!(error = %e, "failed to send shutdown notice");
        }
        let _ = shutdown_tx.send(true);
        for session in state.sessions.snapshot().await {
            state.sessions.remove(session.id()).await;
            session.close().await;
        }

        publisher.abort();
        subscriber.abort();
        Ok(())
    }
}

async fn announce<C: Codec>(
    state: &ServerState<C>,
    text: &str,
) -> Result<BroadcastReport, RelaycastError> {
    let notice = SystemMessage {
        text: text.to_string(),
    };
    let envelope = state.dispatcher.codec().wrap(&notice)?;
    Ok(state.broadcaster.broadcast(&envelope).await?)
}
