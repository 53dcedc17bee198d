//! Per-connection client record shared between a client session, the
//! registry's waiting lists and any driver that matches it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::net::{ConnectionId, PeerLink};
use crate::protocol::SeatTariff;

/// Registry-assigned client identifier. Zero is never a valid id.
pub type ClientId = u32;

/// Window within which a repeated success report confirms the same match.
pub const MATCH_CONFIRM_WINDOW_SECS: u32 = 60;

/// What the client declared in its latest route registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientProfile {
    pub seats: u8,
    pub tariff: u8,
    pub position: [u8; 8],
    pub destination_index: u16,
}

/// Outcome of a match success report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchConfirmation {
    /// A previous report landed within the window: this is a confirmed match.
    Confirmed,
    /// First report; the timestamp has been recorded.
    Stamped,
}

pub struct ClientRecord {
    id: AtomicU32,
    /// Connection id of the driver holding the outstanding offer; 0 if none.
    claimed_by: AtomicU64,
    last_match: AtomicU32,
    profile: Mutex<ClientProfile>,
    link: Arc<PeerLink>,
}

impl ClientRecord {
    pub fn new(link: Arc<PeerLink>) -> Arc<Self> {
        Arc::new(Self {
            id: AtomicU32::new(0),
            claimed_by: AtomicU64::new(0),
            last_match: AtomicU32::new(0),
            profile: Mutex::new(ClientProfile::default()),
            link,
        })
    }

    /// `None` until the first segment registration.
    pub fn id(&self) -> Option<ClientId> {
        match self.id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    /// Set the id if unset. Only the registry calls this, under its write lock.
    pub(crate) fn assign_id(&self, next: impl FnOnce() -> ClientId) -> ClientId {
        match self.id() {
            Some(id) => id,
            None => {
                let id = next();
                self.id.store(id, Ordering::Release);
                id
            }
        }
    }

    pub fn is_matched(&self) -> bool {
        self.claimed_by.load(Ordering::Acquire) != 0
    }

    /// Claim this client for a round of driver `by`. Fails if any round holds it.
    pub fn try_claim(&self, by: ConnectionId) -> bool {
        self.claimed_by
            .compare_exchange(0, by.as_u64(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drop the claim of driver `by`. No effect if someone else holds it.
    pub fn release_claim(&self, by: ConnectionId) -> bool {
        self.claimed_by
            .compare_exchange(by.as_u64(), 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// The client itself declined or re-registered: drop any claim.
    pub fn release(&self) {
        self.claimed_by.store(0, Ordering::Release);
    }

    pub fn profile(&self) -> ClientProfile {
        *self.profile.lock()
    }

    /// Apply a description update; position and destination are untouched.
    pub fn update_description(&self, st: SeatTariff) {
        let mut profile = self.profile.lock();
        profile.seats = st.seats;
        profile.tariff = st.tariff;
    }

    pub fn set_profile(&self, profile: ClientProfile) {
        *self.profile.lock() = profile;
    }

    /// Apply the 60-second de-duplication rule to a success report at `now`
    /// (unix seconds).
    pub fn confirm_match(&self, now: u32) -> MatchConfirmation {
        let last = self.last_match.load(Ordering::Acquire);
        if last > now.saturating_sub(MATCH_CONFIRM_WINDOW_SECS) {
            MatchConfirmation::Confirmed
        } else {
            self.last_match.store(now, Ordering::Release);
            MatchConfirmation::Stamped
        }
    }

    pub fn link(&self) -> &Arc<PeerLink> {
        &self.link
    }
}

impl std::fmt::Debug for ClientRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRecord")
            .field("id", &self.id())
            .field("matched", &self.is_matched())
            .field("profile", &self.profile())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn detached_record() -> Arc<ClientRecord> {
    let link = PeerLink::new(ConnectionId::new(), tokio::io::sink());
    ClientRecord::new(Arc::new(link))
}
