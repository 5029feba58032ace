//! # Relaycast
//!
//! Horizontally scalable chat relay server.
//!
//! Clients connect over TCP and exchange length-prefixed frames. Every
//! chat line a server receives is published to a shared relay channel;
//! every server subscribed to that channel broadcasts what comes back to
//! all of its connected clients. Run as many instances as you like behind
//! a load balancer and everyone still sees every message.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relaycast::prelude::*;
//!
//! # async fn demo() -> Result<(), RelaycastError> {
//! let config = ServerConfig::from_env();
//! let server = RelaycastServerBuilder::from_config(&config)
//!     .build(RedisRelay::open(&config.relay_url)?)
//!     .await?;
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod chat;
pub mod client;
pub mod config;
pub mod dispatch;
mod error;
pub mod fanout;
mod handler;
pub mod server;

pub use error::{ConfigError, RelaycastError};

/// Commonly used types, re-exported for `use relaycast::prelude::*`.
pub mod prelude {
    pub use crate::client::{ChatClient, ChatReceiver, ChatSender};
    pub use crate::config::{Profile, ServerConfig};
    pub use crate::dispatch::{DispatchOutcome, Dispatcher, DropReason, PacketContext};
    pub use crate::fanout::{BroadcastReport, Broadcaster};
    pub use crate::server::{RelaycastServer, RelaycastServerBuilder};
    pub use crate::{ConfigError, RelaycastError};
    pub use relaycast_protocol::{
        ChatMessage, Codec, Envelope, JsonCodec, Message, PacketType, SessionId, SystemMessage,
    };
    pub use relaycast_relay::{MemoryRelay, RedisRelay, Relay, RelayError, RetryPolicy};
    pub use relaycast_session::SessionTable;
}

/// Installs the `tracing` subscriber used by the binaries.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Calling it twice is
/// harmless.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
