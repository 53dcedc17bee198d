//! Connection slot accounting and per-connection identity.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Reserve a connection slot against a per-role maximum at accept time
//! - Release the slot when the session task ends (including on panic)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection, used only for log correlation.
///
/// Distinct from the registry's client id, which is assigned on first route
/// registration and never consumed by rejected connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts live connections of one role and enforces its maximum.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
    max_connections: u64,
    gauge: &'static str,
}

impl ConnectionTracker {
    /// Create a tracker admitting at most `max_connections` concurrent slots.
    /// `gauge` names the metrics gauge mirrored on every change.
    pub fn new(max_connections: u64, gauge: &'static str) -> Self {
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
            max_connections,
            gauge,
        }
    }

    /// Reserve a slot. Returns `None` when the role is at capacity.
    ///
    /// The check and the increment are a single CAS so two racing accepts can
    /// never both take the last slot.
    pub fn try_track(&self) -> Option<ConnectionGuard> {
        let mut current = self.active_count.load(Ordering::Acquire);
        loop {
            if current >= self.max_connections {
                return None;
            }
            match self.active_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        metrics::gauge!(self.gauge).increment(1.0);
        Some(ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            gauge: self.gauge,
            id: ConnectionId::new(),
        })
    }

    /// Current live connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::Acquire)
    }

    pub fn max_connections(&self) -> u64 {
        self.max_connections
    }
}

/// Holds one connection slot. Decrements the active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    gauge: &'static str,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::AcqRel);
        metrics::gauge!(self.gauge).decrement(1.0);
        tracing::trace!(connection_id = %self.id, "Connection slot released");
    }
}
