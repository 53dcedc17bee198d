//! Client session.
//!
//! A client registers one route at a time (an origin and the destinations it
//! would accept), then waits for a driver's offer. Whatever ends the session,
//! the route's segments are unregistered exactly once by [`RouteRegistration`].

use std::sync::Arc;

use tokio::io::AsyncRead;

use super::SessionError;
use crate::auth::unix_now;
use crate::net::PeerLink;
use crate::observability::{Counter, Stats};
use crate::protocol::{ClientMatchStatus, ClientMessage, RouteAdd, REPLY_ACK};
use crate::registry::{ClientProfile, ClientRecord, MatchConfirmation, Node, RouteRegistry};

/// The route a client currently has in the registry.
///
/// Dropping it unregisters every segment.
struct RouteRegistration {
    registry: Arc<RouteRegistry>,
    record: Arc<ClientRecord>,
    route: Option<(Node, Vec<Node>)>,
}

impl RouteRegistration {
    fn new(registry: Arc<RouteRegistry>, record: Arc<ClientRecord>) -> Self {
        Self {
            registry,
            record,
            route: None,
        }
    }

    /// Swap in a new route: old segments leave before new ones join.
    fn replace(&mut self, origin: Node, destinations: Vec<Node>) {
        if self.clear() {
            self.record.release();
        }
        self.registry
            .register_route(origin, &destinations, &self.record);
        self.route = Some((origin, destinations));
    }

    /// Returns whether a route was registered.
    fn clear(&mut self) -> bool {
        let Some((origin, destinations)) = self.route.take() else {
            return false;
        };
        if let Some(id) = self.record.id() {
            self.registry.unregister_route(origin, &destinations, id);
        }
        true
    }
}

impl Drop for RouteRegistration {
    fn drop(&mut self) {
        self.clear();
    }
}

pub struct ClientSession<R> {
    reader: R,
    link: Arc<PeerLink>,
    record: Arc<ClientRecord>,
    registration: RouteRegistration,
    stats: Arc<Stats>,
}

impl<R> ClientSession<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, link: Arc<PeerLink>, registry: Arc<RouteRegistry>, stats: Arc<Stats>) -> Self {
        let record = ClientRecord::new(Arc::clone(&link));
        Self {
            reader,
            link,
            registration: RouteRegistration::new(registry, Arc::clone(&record)),
            record,
            stats,
        }
    }

    pub fn record(&self) -> &Arc<ClientRecord> {
        &self.record
    }

    /// Serve until the peer closes or misbehaves.
    ///
    /// The registration is dropped (and the route unregistered) before this
    /// returns.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let result = self.serve().await;
        if let Err(e) = &result {
            self.stats.incr(Counter::ClientFailedPackets);
            tracing::debug!(connection_id = %self.link.id(), client_id = ?self.record.id(), error = %e, "Client session failed");
        }
        result
    }

    async fn serve(&mut self) -> Result<(), SessionError> {
        loop {
            let message = self
                .link
                .deadline()
                .guard(ClientMessage::read_from(&mut self.reader))
                .await??;
            let Some(message) = message else {
                return Ok(());
            };

            match message {
                ClientMessage::RouteAdd(route) => self.register(route).await?,
                ClientMessage::DescriptionUpdate(st) => self.record.update_description(st),
                ClientMessage::MatchStatus(ClientMatchStatus::Success) => {
                    if self.record.confirm_match(unix_now()) == MatchConfirmation::Confirmed {
                        self.stats.incr(Counter::MatchesSucceeded);
                    }
                    return Ok(());
                }
                ClientMessage::MatchStatus(ClientMatchStatus::Failure) => {
                    self.record.release();
                    self.stats.incr(Counter::ClientFailedMatches);
                }
            }
        }
    }

    async fn register(&mut self, route: RouteAdd) -> Result<(), SessionError> {
        self.record.set_profile(ClientProfile {
            seats: route.profile.seats,
            tariff: route.profile.tariff,
            position: route.position,
            destination_index: route.destination_index,
        });
        self.registration.replace(route.origin, route.destinations);
        tracing::trace!(client_id = ?self.record.id(), origin = route.origin, "Route registered");

        self.link.send(&REPLY_ACK).await.map_err(SessionError::Write)
    }
}
