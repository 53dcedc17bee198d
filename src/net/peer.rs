//! Shared handle to one connection's write side and read deadline.
//!
//! The owning session reads; any task (its own session, a driver delivering an
//! offer, a delivery-failure report) may write. Writes are serialized so frames
//! from different tasks never interleave.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::connection::ConnectionId;
use super::deadline::ReadDeadline;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct PeerLink {
    id: ConnectionId,
    writer: Mutex<BoxedWriter>,
    deadline: ReadDeadline,
}

impl PeerLink {
    pub fn new<W>(id: ConnectionId, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            writer: Mutex::new(Box::new(writer)),
            deadline: ReadDeadline::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Write one complete frame.
    ///
    /// Bounded by the same deadline as reads; a cleared deadline leaves the
    /// write unbounded.
    pub async fn send(&self, frame: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        self.deadline
            .guard(async {
                writer.write_all(frame).await?;
                writer.flush().await
            })
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::TimedOut, e))?
    }

    /// Best-effort shutdown of the write side.
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    pub fn deadline(&self) -> &ReadDeadline {
        &self.deadline
    }

    /// Drop the idle deadline so the session keeps waiting for its peer.
    pub fn release_deadline(&self) {
        self.deadline.clear();
        tracing::debug!(connection_id = %self.id, "Read deadline released");
    }
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("id", &self.id)
            .field("deadline", &self.deadline.get())
            .finish()
    }
}
