//! Server wiring: three listeners, one shared state.
//!
//! # Responsibilities
//! - Bind the client, driver and admin ports
//! - Reserve a connection slot per role before authentication
//! - Run the handshake, count the outcome and hand off to the session
//! - Stop every accept loop on shutdown

pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use crate::auth::AuthError;
use crate::config::MatcherConfig;
use crate::net::{ConnectionGuard, ConnectionId, Listener, ListenerError, PeerLink};
use crate::observability::Counter;
use crate::protocol::REPLY_BUSY;
use crate::session::{AdminSession, ClientSession, DriverSession};

pub use state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("invalid handshake configuration: {0}")]
    Auth(#[from] AuthError),
}

/// Which protocol a listener speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Driver,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Driver => "driver",
            Role::Admin => "admin",
        }
    }
}

/// Actual bound addresses, useful when the config asked for port 0.
#[derive(Debug, Clone, Copy)]
pub struct BoundAddrs {
    pub client: SocketAddr,
    pub driver: SocketAddr,
    pub admin: SocketAddr,
}

pub struct MatchServer {
    state: AppState,
    client: Listener,
    driver: Listener,
    admin: Listener,
}

impl MatchServer {
    /// Build the shared state and bind all three ports.
    pub async fn bind(config: &MatcherConfig) -> Result<Self, ServerError> {
        let state = AppState::from_config(config)?;
        let client = Listener::bind(&config.listener.client_address, Role::Client.as_str()).await?;
        let driver = Listener::bind(&config.listener.driver_address, Role::Driver.as_str()).await?;
        let admin = Listener::bind(&config.listener.admin_address, Role::Admin.as_str()).await?;

        Ok(Self {
            state,
            client,
            driver,
            admin,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn local_addrs(&self) -> std::io::Result<BoundAddrs> {
        Ok(BoundAddrs {
            client: self.client.local_addr()?,
            driver: self.driver.local_addr()?,
            admin: self.admin.local_addr()?,
        })
    }

    /// Serve until `shutdown` fires or one accept loop fails.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let Self {
            state,
            client,
            driver,
            admin,
        } = self;

        let client_state = state.clone();
        let driver_state = state.clone();
        let admin_state = state;

        tokio::try_join!(
            client.serve(shutdown.resubscribe(), move |stream, peer| {
                handle_connection(client_state.clone(), Role::Client, stream, peer)
            }),
            driver.serve(shutdown.resubscribe(), move |stream, peer| {
                handle_connection(driver_state.clone(), Role::Driver, stream, peer)
            }),
            admin.serve(shutdown, move |stream, peer| {
                handle_connection(admin_state.clone(), Role::Admin, stream, peer)
            }),
        )?;

        tracing::info!("All listeners stopped");
        Ok(())
    }
}

/// Outcome of the capacity check at accept time.
#[derive(Debug)]
enum Admission {
    Slot(ConnectionGuard),
    /// Admin connections are not limited.
    Unlimited,
    AtCapacity,
}

impl Admission {
    fn check(state: &AppState, role: Role) -> Self {
        let tracker = match role {
            Role::Client => &state.stats.clients,
            Role::Driver => &state.stats.drivers,
            Role::Admin => return Admission::Unlimited,
        };
        match tracker.try_track() {
            Some(guard) => Admission::Slot(guard),
            None => Admission::AtCapacity,
        }
    }

    fn connection_id(&self) -> ConnectionId {
        match self {
            Admission::Slot(guard) => guard.id(),
            _ => ConnectionId::new(),
        }
    }
}

async fn handle_connection(state: AppState, role: Role, mut stream: TcpStream, peer: SocketAddr) {
    let admission = Admission::check(&state, role);
    if let Admission::AtCapacity = admission {
        tracing::warn!(role = role.as_str(), peer = %peer, "At capacity, rejecting connection");
        let _ = stream.write_all(&REPLY_BUSY).await;
        let _ = stream.shutdown().await;
        return;
    }
    let connection_id = admission.connection_id();

    let (authenticator, succeeded, failed) = match role {
        Role::Client => (&state.session_auth, Some(Counter::ClientAuthSucceeded), Some(Counter::ClientAuthFailed)),
        Role::Driver => (&state.session_auth, Some(Counter::DriverAuthSucceeded), Some(Counter::DriverAuthFailed)),
        Role::Admin => (&state.admin_auth, None, None),
    };

    let deadline = match authenticator.authenticate(&mut stream).await {
        Ok(deadline) => {
            if let Some(counter) = succeeded {
                state.stats.incr(counter);
            }
            deadline
        }
        Err(e) => {
            if let Some(counter) = failed {
                state.stats.incr(counter);
            }
            tracing::warn!(role = role.as_str(), peer = %peer, connection_id = %connection_id, error = %e, "Authentication failed");
            return;
        }
    };

    tracing::debug!(role = role.as_str(), peer = %peer, connection_id = %connection_id, "Session started");

    let (reader, writer) = stream.into_split();
    let link = Arc::new(PeerLink::new(connection_id, writer));
    link.deadline().set(deadline);

    let result = match role {
        Role::Client => {
            ClientSession::new(reader, Arc::clone(&link), Arc::clone(&state.registry), Arc::clone(&state.stats))
                .run()
                .await
        }
        Role::Driver => {
            DriverSession::new(reader, Arc::clone(&link), Arc::clone(&state.registry), Arc::clone(&state.stats))
                .run()
                .await
        }
        Role::Admin => AdminSession::new(reader, Arc::clone(&link), Arc::clone(&state.stats)).run().await,
    };

    match result {
        Ok(()) => tracing::debug!(role = role.as_str(), connection_id = %connection_id, "Session closed"),
        Err(e) => tracing::debug!(role = role.as_str(), connection_id = %connection_id, error = %e, "Session aborted"),
    }
    link.shutdown().await;
    drop(admission);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_session_roles_are_capped() {
        let mut config = MatcherConfig::default();
        config.limits.max_clients = 1;
        let state = AppState::from_config(&config).unwrap();

        let first = Admission::check(&state, Role::Client);
        assert!(matches!(first, Admission::Slot(_)));
        assert!(matches!(Admission::check(&state, Role::Client), Admission::AtCapacity));
        assert!(matches!(Admission::check(&state, Role::Admin), Admission::Unlimited));
        assert!(matches!(Admission::check(&state, Role::Driver), Admission::Slot(_)));

        drop(first);
        assert!(matches!(Admission::check(&state, Role::Client), Admission::Slot(_)));
    }

    #[test]
    fn reserved_slot_is_reported_before_authentication() {
        let state = AppState::from_config(&MatcherConfig::default()).unwrap();

        let pending = Admission::check(&state, Role::Driver);
        let snapshot = state.stats.snapshot();
        assert_eq!(snapshot.drivers_connected, 1);
        assert_eq!(snapshot.driver_auth_succeeded, 0);

        drop(pending);
        assert_eq!(state.stats.snapshot().drivers_connected, 0);
    }
}
