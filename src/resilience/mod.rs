//! Resilience subsystem.
//!
//! The only retry in the service is the accept loop's backoff on transient
//! errors. Everything else fails fast: registry state is ephemeral and peers
//! rebuild it by reconnecting.

pub mod backoff;

pub use backoff::AcceptBackoff;
