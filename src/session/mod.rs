//! Per-connection session state machines.
//!
//! # Data Flow
//! ```text
//! Authenticated connection
//!     → client.rs (route registration, match status; mutates the registry)
//!     → driver.rs (route plan, match search; queries the registry)
//!     → admin.rs  (counter snapshots; read-only)
//! ```
//!
//! # Design Decisions
//! - Sessions are generic over the read half so tests drive them over
//!   in-memory pipes
//! - `Ok(())` is a graceful close; every `Err` counts as a failed packet
//! - All reads go through the connection's releasable deadline

pub mod admin;
pub mod client;
pub mod driver;

use std::io;

use crate::net::DeadlineExceeded;
use crate::protocol::ProtocolError;

pub use admin::AdminSession;
pub use client::ClientSession;
pub use driver::DriverSession;

/// Reasons a session ends ungracefully.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("idle deadline exceeded")]
    Deadline(#[from] DeadlineExceeded),

    #[error("failed to write reply: {0}")]
    Write(#[source] io::Error),

    #[error("match search index {sequence} outside a plan of {plan_len} nodes")]
    SequenceOutOfRange { sequence: u8, plan_len: usize },
}
