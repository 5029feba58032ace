//! Session management for Relaycast.
//!
//! This crate tracks who is connected:
//!
//! 1. **Session table** ([`SessionTable`]) — live connections keyed by a
//!    server-assigned [`SessionId`](relaycast_protocol::SessionId), safe to
//!    share across connection tasks.
//! 2. **Write synchronization** ([`Session::send_guard`]) — one writer at a
//!    time per connection, so frames from concurrent writers never
//!    interleave.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server / Fan-out (above)  ← add on accept, remove on close, iterate to broadcast
//!     ↕
//! Session Layer (this crate)  ← ids, peer addresses, guarded write halves
//!     ↕
//! Protocol Layer (below)  ← SessionId, frame writing
//! ```

mod error;
mod session;
mod table;

pub use error::SessionError;
pub use session::{BoxedWriter, SendGuard, Session, SessionConfig};
pub use table::SessionTable;
