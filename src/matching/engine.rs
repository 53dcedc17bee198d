//! Route match search.
//!
//! A driver at plan index `s` looks for clients waiting at `plan[s]` whose
//! destination is some later plan node. Farther destinations are scanned
//! first; within one segment clients are taken in registration order.

use std::sync::Arc;

use crate::net::ConnectionId;
use crate::protocol::driver::MatchEntry;
use crate::protocol::SeatTariff;
use crate::registry::{ClientRecord, Node, RouteRegistry};

/// Upper bound on clients accepted in one round.
pub const MAX_ROUND_SIZE: usize = 4;

/// Clients claimed by one search, in acceptance order.
#[derive(Debug, Default)]
pub struct MatchRound {
    clients: Vec<Arc<ClientRecord>>,
}

impl MatchRound {
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn clients(&self) -> &[Arc<ClientRecord>] {
        &self.clients
    }

    /// Position and destination index of each accepted client, for the
    /// driver's match list.
    pub fn entries(&self) -> Vec<MatchEntry> {
        self.clients
            .iter()
            .map(|client| {
                let profile = client.profile();
                MatchEntry {
                    position: profile.position,
                    destination_index: profile.destination_index,
                }
            })
            .collect()
    }

    /// Give every client back to the pool.
    pub fn release_all(&self, driver: ConnectionId) {
        for client in &self.clients {
            client.release_claim(driver);
        }
    }

    pub fn into_clients(self) -> Vec<Arc<ClientRecord>> {
        self.clients
    }
}

/// Run one search for `driver` positioned at `plan[sequence]`.
///
/// Accepted clients are claimed by `driver` before this returns.
/// `sequence` must index into `plan`.
pub fn search(
    registry: &RouteRegistry,
    plan: &[Node],
    sequence: usize,
    capacity: SeatTariff,
    driver: ConnectionId,
) -> MatchRound {
    let mut round = MatchRound::default();
    let Some(&origin) = plan.get(sequence) else {
        return round;
    };
    if !registry.is_node_interested(origin) {
        return round;
    }

    let mut free_seats = capacity.seats;
    for &destination in plan[sequence + 1..].iter().rev() {
        for client in registry.segment_snapshot(origin, destination) {
            if client.is_matched() {
                continue;
            }
            let profile = client.profile();
            if profile.seats > free_seats || capacity.tariff > profile.tariff {
                continue;
            }
            // Another driver may have claimed it since the check above.
            if !client.try_claim(driver) {
                continue;
            }

            free_seats -= profile.seats;
            round.clients.push(client);
            if free_seats == 0 || round.clients.len() == MAX_ROUND_SIZE {
                return round;
            }
        }
    }
    round
}
