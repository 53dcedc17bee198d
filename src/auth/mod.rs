//! Connection authentication.
//!
//! Every accepted connection sends one fixed-size encrypted handshake before
//! any protocol traffic. Client and driver ports share one policy; the admin
//! port has its own key, code, version and tolerances.
//!
//! Outcomes:
//! - version mismatch → `40 01`, close
//! - timestamp outside tolerance → `40 02`, close
//! - wrong code, short read, timeout → silent close
//! - success → absolute idle deadline for the session

pub mod handshake;

use std::io;

pub use handshake::{seal_handshake, unix_now, Authenticator, HandshakePolicy, HANDSHAKE_LEN};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("handshake read failed: {0}")]
    Io(#[from] io::Error),

    #[error("handshake not received in time")]
    Timeout,

    #[error("protocol version {received:#04x}, expected {expected:#04x}")]
    VersionMismatch { expected: u8, received: u8 },

    #[error("handshake code mismatch")]
    BadCode,

    #[error("handshake timestamp off by {skew_secs}s")]
    StaleTimestamp { skew_secs: i64 },

    #[error("handshake key must be 16 hex-encoded bytes")]
    InvalidKey,
}
