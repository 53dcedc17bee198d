//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, transient-error backoff)
//!     → connection.rs (per-role capacity slot, connection id)
//!     → auth (handshake, arms deadline.rs)
//!     → peer.rs (shared writer + deadline, reachable from other sessions)
//!     → Hand off to a client, driver or admin session
//! ```
//!
//! # Design Decisions
//! - One listener type serves all three ports; roles differ only in handler
//! - Capacity is reserved atomically before authentication
//! - Idle deadlines are absolute and releasable by other tasks

pub mod connection;
pub mod deadline;
pub mod listener;
pub mod peer;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use deadline::{DeadlineExceeded, ReadDeadline};
pub use listener::{Listener, ListenerError};
pub use peer::PeerLink;
