//! Admin session: answers counter snapshot requests until the peer leaves.

use std::sync::Arc;

use tokio::io::AsyncRead;

use super::SessionError;
use crate::net::PeerLink;
use crate::observability::Stats;
use crate::protocol::admin::{encode_snapshot, AdminRequest};

pub struct AdminSession<R> {
    reader: R,
    link: Arc<PeerLink>,
    stats: Arc<Stats>,
}

impl<R> AdminSession<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, link: Arc<PeerLink>, stats: Arc<Stats>) -> Self {
        Self { reader, link, stats }
    }

    pub async fn run(mut self) -> Result<(), SessionError> {
        loop {
            let request = self
                .link
                .deadline()
                .guard(AdminRequest::read_from(&mut self.reader))
                .await??;
            match request {
                Some(AdminRequest::Snapshot) => {
                    let reply = encode_snapshot(&self.stats.snapshot());
                    self.link.send(&reply).await.map_err(SessionError::Write)?;
                }
                None => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ConnectionId;
    use crate::observability::Counter;
    use crate::protocol::admin::{decode_snapshot, MAX_SNAPSHOT_LEN};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn answers_snapshot_requests() {
        let stats = Arc::new(Stats::new(10, 10));
        stats.add(Counter::MatchesFound, 300);
        stats.incr(Counter::DriverCancelledMatches);
        let _client_slot = stats.clients.try_track().unwrap();

        let (server, mut peer) = tokio::io::duplex(256);
        let (reader, writer) = tokio::io::split(server);
        let link = Arc::new(PeerLink::new(ConnectionId::new(), writer));
        let session = tokio::spawn(AdminSession::new(reader, link, Arc::clone(&stats)).run());

        peer.write_all(&AdminRequest::Snapshot.encode()).await.unwrap();
        let mut header = [0u8; 3];
        peer.read_exact(&mut header).await.unwrap();
        assert_eq!(&header[..2], &[0x20, 0x01]);
        let total = usize::from(header[2]);
        assert!(total <= MAX_SNAPSHOT_LEN);

        let mut frame = header.to_vec();
        frame.resize(total, 0);
        peer.read_exact(&mut frame[3..]).await.unwrap();
        let snapshot = decode_snapshot(&frame).unwrap();
        assert_eq!(snapshot.clients_connected, 1);
        assert_eq!(snapshot.matches_found, 300);
        assert_eq!(snapshot.driver_cancelled_matches, 1);

        drop(peer);
        assert!(session.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn bad_magic_closes_session() {
        let stats = Arc::new(Stats::new(1, 1));
        let (server, mut peer) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(server);
        let link = Arc::new(PeerLink::new(ConnectionId::new(), writer));
        let session = tokio::spawn(AdminSession::new(reader, link, stats).run());

        peer.write_all(&[0x48, 0x01, 0x03]).await.unwrap();
        assert!(session.await.unwrap().is_err());
    }
}
