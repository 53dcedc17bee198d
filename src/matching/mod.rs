//! Matching subsystem.
//!
//! # Data Flow
//! ```text
//! Driver match search (plan, sequence index)
//!     → engine.rs (scan registry snapshots, claim eligible clients)
//!     → driver session writes the match list
//!     → delivery.rs (one task per client: offer, or failure report to driver)
//! ```
//!
//! # Design Decisions
//! - Claiming is a compare-and-swap on the client record, so two drivers
//!   never accept the same client
//! - Delivery tasks never touch the registry

pub mod delivery;
pub mod engine;

pub use delivery::{deliver_aborts, deliver_offers};
pub use engine::{search, MatchRound, MAX_ROUND_SIZE};
