//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Sessions, listeners, matching engine produce:
//!     → stats.rs (atomic counters, read by the admin channel)
//!     → metrics.rs (same counters + round histogram, Prometheus scrape)
//!     → logging.rs (structured tracing events)
//! ```
//!
//! # Design Decisions
//! - Counters never gate behavior
//! - Stats is an explicit shared object, not a set of globals

pub mod logging;
pub mod metrics;
pub mod stats;

pub use stats::{Counter, Stats, StatsSnapshot};
