//! Driver session.
//!
//! Holds the driver's route plan and search cursor, runs match searches as the
//! driver advances, and tracks the last round until the driver confirms or
//! cancels it.

use std::sync::Arc;

use tokio::io::AsyncRead;

use super::SessionError;
use crate::auth::unix_now;
use crate::matching::{deliver_aborts, deliver_offers, search};
use crate::net::{ConnectionId, PeerLink};
use crate::observability::metrics::record_round;
use crate::observability::{Counter, Stats};
use crate::protocol::driver::encode_match_list;
use crate::protocol::{DriverMatchStatus, DriverMessage, RoutePlan, SeatTariff, REPLY_ACK};
use crate::registry::{ClientRecord, MatchConfirmation, Node, RouteRegistry};

/// Clients offered to this driver and not yet confirmed or cancelled.
///
/// Rounds accumulate until the next match status. Dropping it (session end)
/// releases the claims it still holds.
#[derive(Debug)]
struct PendingRound {
    driver: ConnectionId,
    clients: Vec<Arc<ClientRecord>>,
}

impl PendingRound {
    fn new(driver: ConnectionId) -> Self {
        Self {
            driver,
            clients: Vec::new(),
        }
    }

    /// Add a new round. Earlier offers stay claimed until a match status.
    fn extend(&mut self, clients: Vec<Arc<ClientRecord>>) {
        self.clients.extend(clients);
    }

    /// Hand the clients over without releasing them.
    fn take(&mut self) -> Vec<Arc<ClientRecord>> {
        std::mem::take(&mut self.clients)
    }

    fn release(&mut self) {
        for client in self.clients.drain(..) {
            client.release_claim(self.driver);
        }
    }
}

impl Drop for PendingRound {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct DriverSession<R> {
    reader: R,
    link: Arc<PeerLink>,
    registry: Arc<RouteRegistry>,
    stats: Arc<Stats>,
    plan: Option<Vec<Node>>,
    cursor: Option<u8>,
    /// Free seats and tariff; from the first plan, then description updates.
    capacity: SeatTariff,
    vehicle_info: [u8; 2],
    pending: PendingRound,
}

impl<R> DriverSession<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, link: Arc<PeerLink>, registry: Arc<RouteRegistry>, stats: Arc<Stats>) -> Self {
        let link_id = link.id();
        Self {
            reader,
            link,
            registry,
            stats,
            plan: None,
            cursor: None,
            capacity: SeatTariff::default(),
            vehicle_info: [0; 2],
            pending: PendingRound::new(link_id),
        }
    }

    /// Serve until the peer closes or misbehaves. Pending clients are
    /// released before this returns.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let result = self.serve().await;
        if let Err(e) = &result {
            self.stats.incr(Counter::DriverFailedPackets);
            tracing::debug!(connection_id = %self.link.id(), error = %e, "Driver session failed");
        }
        result
    }

    async fn serve(&mut self) -> Result<(), SessionError> {
        loop {
            let message = self
                .link
                .deadline()
                .guard(DriverMessage::read_from(&mut self.reader))
                .await??;
            let Some(message) = message else {
                return Ok(());
            };

            match message {
                DriverMessage::MatchSearch { sequence } => self.match_search(sequence).await?,
                DriverMessage::RoutePlan(plan) => self.set_plan(plan).await?,
                DriverMessage::DescriptionUpdate(capacity) => self.capacity = capacity,
                DriverMessage::MatchStatus(DriverMatchStatus::Confirm) => self.confirm(),
                DriverMessage::MatchStatus(DriverMatchStatus::Cancel) => self.cancel(),
            }
        }
    }

    async fn set_plan(&mut self, plan: RoutePlan) -> Result<(), SessionError> {
        if self.plan.is_none() {
            self.capacity = plan.profile;
            self.vehicle_info = plan.vehicle_info;
        }
        tracing::trace!(connection_id = %self.link.id(), nodes = plan.nodes.len(), "Route plan set");
        self.plan = Some(plan.nodes);
        self.cursor = None;

        self.link.send(&REPLY_ACK).await.map_err(SessionError::Write)
    }

    async fn match_search(&mut self, sequence: u8) -> Result<(), SessionError> {
        if self.cursor == Some(sequence) {
            return Ok(());
        }
        let plan = self.plan.as_deref().unwrap_or_default();
        let index = usize::from(sequence);
        if index >= plan.len() {
            return Err(SessionError::SequenceOutOfRange {
                sequence,
                plan_len: plan.len(),
            });
        }
        self.cursor = Some(sequence);

        let round = search(&self.registry, plan, index, self.capacity, self.link.id());
        if round.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.link.send(&encode_match_list(&round.entries())).await {
            tracing::debug!(connection_id = %self.link.id(), error = %e, "Match list not delivered");
            round.release_all(self.link.id());
            return Ok(());
        }

        deliver_offers(&self.link, round.clients(), self.capacity.tariff, self.vehicle_info);
        self.stats.add(Counter::MatchesFound, round.len() as u64);
        record_round(round.len());
        tracing::debug!(connection_id = %self.link.id(), node = plan[index], clients = round.len(), "Match round offered");

        self.pending.extend(round.into_clients());
        Ok(())
    }

    fn confirm(&mut self) {
        let now = unix_now();
        for client in self.pending.take() {
            if client.confirm_match(now) == MatchConfirmation::Confirmed {
                self.stats.incr(Counter::MatchesSucceeded);
            }
        }
    }

    fn cancel(&mut self) {
        let driver = self.link.id();
        // A client that already declined may be claimed by another driver by
        // now; it gets no abort from this one.
        let aborted: Vec<_> = self
            .pending
            .take()
            .into_iter()
            .filter(|client| client.release_claim(driver) || !client.is_matched())
            .collect();
        deliver_aborts(&aborted);
        self.stats.incr(Counter::DriverCancelledMatches);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::driver::encode_route_plan;
    use crate::registry::ClientProfile;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    struct Harness {
        registry: Arc<RouteRegistry>,
        stats: Arc<Stats>,
        peer: DuplexStream,
        session: tokio::task::JoinHandle<Result<(), SessionError>>,
    }

    fn start() -> Harness {
        let registry = Arc::new(RouteRegistry::new());
        let stats = Arc::new(Stats::new(10, 10));
        let (server, peer) = tokio::io::duplex(256);
        let (reader, writer) = tokio::io::split(server);
        let link = Arc::new(PeerLink::new(ConnectionId::new(), writer));
        let session = DriverSession::new(reader, link, Arc::clone(&registry), Arc::clone(&stats));
        Harness {
            registry,
            stats,
            peer,
            session: tokio::spawn(session.run()),
        }
    }

    /// A waiting client whose connection is the returned stream.
    fn waiting_client(registry: &RouteRegistry, origin: Node, dests: &[Node], seats: u8, tariff: u8) -> (Arc<ClientRecord>, DuplexStream) {
        let (local, remote) = tokio::io::duplex(64);
        let record = ClientRecord::new(Arc::new(PeerLink::new(ConnectionId::new(), local)));
        record.set_profile(ClientProfile {
            seats,
            tariff,
            position: [0xAA; 8],
            destination_index: 9,
        });
        registry.register_route(origin, dests, &record);
        (record, remote)
    }

    fn plan(nodes: Vec<Node>, seats: u8, tariff: u8) -> Vec<u8> {
        encode_route_plan(&RoutePlan {
            profile: SeatTariff::new(seats, tariff),
            vehicle_info: [0x0B, 0x0C],
            nodes,
        })
        .unwrap()
    }

    async fn read_n(stream: &mut DuplexStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        stream.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn search_offers_client_once() {
        let mut h = start();
        let (client, mut client_peer) = waiting_client(&h.registry, 10, &[20, 30], 1, 2);

        h.peer.write_all(&plan(vec![10, 20, 30], 4, 1)).await.unwrap();
        assert_eq!(read_n(&mut h.peer, 2).await, REPLY_ACK);

        h.peer.write_all(&[0x14, 0x00]).await.unwrap();
        let list = read_n(&mut h.peer, 13).await;
        assert_eq!(&list[..3], &[0x22, 0x01, 1]);
        assert_eq!(&list[3..11], &[0xAA; 8]);
        assert_eq!(&list[11..], &[0, 9]);

        assert_eq!(read_n(&mut client_peer, 5).await, vec![0x22, 0x01, 1, 0x0B, 0x0C]);
        assert!(client.is_matched());
        assert_eq!(h.stats.get(Counter::MatchesFound), 1);
    }

    #[tokio::test]
    async fn repeated_sequence_is_ignored() {
        let mut h = start();
        let (_client, _client_peer) = waiting_client(&h.registry, 10, &[20], 1, 2);

        h.peer.write_all(&plan(vec![10, 20], 4, 1)).await.unwrap();
        read_n(&mut h.peer, 2).await;
        h.peer.write_all(&[0x14, 0x00, 0x14, 0x00]).await.unwrap();
        read_n(&mut h.peer, 13).await;

        // Out-of-range search forces the session to end so nothing else can
        // be pending on the wire.
        h.peer.write_all(&[0x14, 0x05]).await.unwrap();
        let mut rest = Vec::new();
        h.peer.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(h.stats.get(Counter::MatchesFound), 1);
    }

    #[tokio::test]
    async fn out_of_range_search_ends_session_and_releases_pending() {
        let mut h = start();
        let (client, _client_peer) = waiting_client(&h.registry, 10, &[20], 1, 2);

        h.peer.write_all(&plan(vec![10, 20], 4, 1)).await.unwrap();
        read_n(&mut h.peer, 2).await;
        h.peer.write_all(&[0x14, 0x00]).await.unwrap();
        read_n(&mut h.peer, 13).await;
        assert!(client.is_matched());

        h.peer.write_all(&[0x14, 0x02]).await.unwrap();
        assert!(matches!(
            h.session.await.unwrap(),
            Err(SessionError::SequenceOutOfRange { sequence: 2, plan_len: 2 })
        ));
        assert!(!client.is_matched());
        assert_eq!(h.stats.get(Counter::DriverFailedPackets), 1);
    }

    #[tokio::test]
    async fn search_without_plan_is_a_violation() {
        let mut h = start();
        h.peer.write_all(&[0x14, 0x00]).await.unwrap();
        assert!(matches!(
            h.session.await.unwrap(),
            Err(SessionError::SequenceOutOfRange { plan_len: 0, .. })
        ));
    }

    #[tokio::test]
    async fn cancel_releases_and_aborts() {
        let mut h = start();
        let (client, mut client_peer) = waiting_client(&h.registry, 1, &[2], 1, 0);

        h.peer.write_all(&plan(vec![1, 2], 1, 0)).await.unwrap();
        read_n(&mut h.peer, 2).await;
        h.peer.write_all(&[0x14, 0x00]).await.unwrap();
        read_n(&mut h.peer, 13).await;
        read_n(&mut client_peer, 5).await;

        h.peer.write_all(&[0x13, 0x02]).await.unwrap();
        assert_eq!(read_n(&mut client_peer, 2).await, vec![0x22, 0x02]);
        assert!(!client.is_matched());
        assert_eq!(h.stats.get(Counter::DriverCancelledMatches), 1);
    }

    #[tokio::test]
    async fn confirm_keeps_clients_claimed() {
        let mut h = start();
        let (client, _client_peer) = waiting_client(&h.registry, 1, &[2], 1, 0);

        h.peer.write_all(&plan(vec![1, 2], 1, 0)).await.unwrap();
        read_n(&mut h.peer, 2).await;
        h.peer.write_all(&[0x14, 0x00, 0x13, 0x01]).await.unwrap();
        read_n(&mut h.peer, 13).await;

        drop(h.peer);
        assert!(h.session.await.unwrap().is_ok());
        // Confirmed clients are no longer pending, so session end leaves them.
        assert!(client.is_matched());
    }

    #[tokio::test]
    async fn later_round_keeps_earlier_offers_claimed() {
        let mut h = start();
        let (first, mut first_peer) = waiting_client(&h.registry, 1, &[3], 1, 0);
        let (second, mut second_peer) = waiting_client(&h.registry, 2, &[3], 1, 0);

        h.peer.write_all(&plan(vec![1, 2, 3], 4, 0)).await.unwrap();
        read_n(&mut h.peer, 2).await;
        h.peer.write_all(&[0x14, 0x00]).await.unwrap();
        read_n(&mut h.peer, 13).await;
        read_n(&mut first_peer, 5).await;

        h.peer.write_all(&[0x14, 0x01]).await.unwrap();
        read_n(&mut h.peer, 13).await;
        read_n(&mut second_peer, 5).await;

        assert!(first.is_matched());
        assert!(second.is_matched());
        // Another driver passing node 1 finds nobody to take.
        let other = search(&h.registry, &[1, 3], 0, SeatTariff::new(4, 0), ConnectionId::new());
        assert!(other.is_empty());

        // One cancel covers both rounds.
        h.peer.write_all(&[0x13, 0x02]).await.unwrap();
        assert_eq!(read_n(&mut first_peer, 2).await, vec![0x22, 0x02]);
        assert_eq!(read_n(&mut second_peer, 2).await, vec![0x22, 0x02]);
        assert!(!first.is_matched());
        assert!(!second.is_matched());
        assert_eq!(h.stats.get(Counter::DriverCancelledMatches), 1);
    }

    #[tokio::test]
    async fn eof_releases_pending_round() {
        let mut h = start();
        let (client, _client_peer) = waiting_client(&h.registry, 1, &[2], 1, 0);

        h.peer.write_all(&plan(vec![1, 2], 1, 0)).await.unwrap();
        read_n(&mut h.peer, 2).await;
        h.peer.write_all(&[0x14, 0x00]).await.unwrap();
        read_n(&mut h.peer, 13).await;

        drop(h.peer);
        assert!(h.session.await.unwrap().is_ok());
        assert!(!client.is_matched());
    }

    #[tokio::test]
    async fn first_plan_fixes_vehicle_info_and_description_updates_capacity() {
        let mut h = start();
        let (_client, mut client_peer) = waiting_client(&h.registry, 1, &[2], 3, 5);

        // First plan: one seat, so a three-seat client does not fit.
        h.peer.write_all(&plan(vec![1, 2], 1, 0)).await.unwrap();
        read_n(&mut h.peer, 2).await;
        h.peer.write_all(&[0x14, 0x00]).await.unwrap();

        // A later plan's capacity is ignored; a description update is not.
        h.peer.write_all(&plan(vec![1, 2], 9, 0)).await.unwrap();
        read_n(&mut h.peer, 2).await;
        h.peer.write_all(&[0x12, 0x53, 0x14, 0x00]).await.unwrap();

        assert_eq!(read_n(&mut h.peer, 3).await, vec![0x22, 0x01, 1]);
        read_n(&mut h.peer, 10).await;
        assert_eq!(read_n(&mut client_peer, 5).await, vec![0x22, 0x01, 5, 0x0B, 0x0C]);
    }
}
