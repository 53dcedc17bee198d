//! Shared state handed to every connection handler.

use std::sync::Arc;

use crate::auth::{AuthError, Authenticator, HandshakePolicy};
use crate::config::MatcherConfig;
use crate::observability::Stats;
use crate::registry::RouteRegistry;

/// Application state injected into connection handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RouteRegistry>,
    pub stats: Arc<Stats>,
    /// Client and driver ports.
    pub session_auth: Arc<Authenticator>,
    pub admin_auth: Arc<Authenticator>,
}

impl AppState {
    pub fn from_config(config: &MatcherConfig) -> Result<Self, AuthError> {
        let session = HandshakePolicy::from_config(&config.auth.session)?;
        let admin = HandshakePolicy::from_config(&config.auth.admin)?;

        Ok(Self {
            registry: Arc::new(RouteRegistry::new()),
            stats: Arc::new(Stats::new(config.limits.max_clients, config.limits.max_drivers)),
            session_auth: Arc::new(Authenticator::new(session)),
            admin_auth: Arc::new(Authenticator::new(admin)),
        })
    }
}
