//! Route registry subsystem.
//!
//! # Data Flow
//! ```text
//! Client route registration
//!     → route_registry.rs (one segment per destination, node interest counts)
//!     → waitlist.rs (FIFO of records per segment)
//!     → record.rs (shared per-client state, claimed by drivers)
//! ```
//!
//! # Design Decisions
//! - Sparse maps instead of node-indexed tables; memory follows live routes
//! - Node interest counts memberships, so it returns to zero exactly when the
//!   last segment from that node empties
//! - Snapshots are owned clones; nothing holds the registry lock while writing
//!   to a socket

pub mod record;
pub mod route_registry;
pub mod segment;
pub mod waitlist;

pub use record::{ClientId, ClientProfile, ClientRecord, MatchConfirmation, MATCH_CONFIRM_WINDOW_SECS};
pub use route_registry::RouteRegistry;
pub use segment::{Node, SegmentKey};
pub use waitlist::WaitList;
