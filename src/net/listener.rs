//! TCP listener and accept loop.
//!
//! # Responsibilities
//! - Bind to a configured address
//! - Accept incoming TCP connections and spawn one session task per connection
//! - Back off on transient accept errors; surface fatal ones
//! - Stop on the shutdown signal
//!
//! Capacity limits are enforced by the session handler, not here: a rejected
//! connection still needs to be accepted to receive its busy reply.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use crate::resilience::AcceptBackoff;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(io::Error),
    /// Non-transient accept failure; the loop has stopped.
    Accept(io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A named TCP listener for one logical port (client, driver or admin).
pub struct Listener {
    inner: TcpListener,
    role: &'static str,
}

impl Listener {
    /// Bind to `address`.
    pub async fn bind(address: &str, role: &'static str) -> Result<Self, ListenerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ListenerError::Bind(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(role, address = %local_addr, "Listener bound");

        Ok(Self {
            inner: listener,
            role,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.inner.local_addr()
    }

    /// Run the accept loop until shutdown or a fatal accept error.
    ///
    /// `handler` builds the session future for each accepted stream; it is
    /// spawned and never awaited here.
    pub async fn serve<F, Fut>(
        self,
        mut shutdown: broadcast::Receiver<()>,
        handler: F,
    ) -> Result<(), ListenerError>
    where
        F: Fn(TcpStream, SocketAddr) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut backoff = AcceptBackoff::new();

        loop {
            tokio::select! {
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer)) => {
                        backoff.reset();
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!(role = self.role, peer = %peer, error = %e, "set_nodelay failed");
                        }
                        tracing::debug!(role = self.role, peer = %peer, "Connection accepted");
                        tokio::spawn(handler(stream, peer));
                    }
                    Err(e) if is_transient(&e) => {
                        let delay = backoff.next_delay();
                        tracing::warn!(role = self.role, error = %e, delay = ?delay, "Transient accept error");
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        tracing::error!(role = self.role, error = %e, "Accept loop failed");
                        return Err(ListenerError::Accept(e));
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!(role = self.role, "Listener received shutdown signal");
                    return Ok(());
                }
            }
        }
    }
}

/// Errors after which accepting again may succeed.
pub fn is_transient(e: &io::Error) -> bool {
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;

    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || matches!(e.raw_os_error(), Some(ENFILE) | Some(EMFILE))
}
