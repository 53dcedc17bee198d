//! Real-time route matching between waiting clients and moving drivers.

// Core subsystems
pub mod matching;
pub mod protocol;
pub mod registry;
pub mod session;

// Connection handling
pub mod auth;
pub mod net;
pub mod server;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::MatcherConfig;
pub use lifecycle::Shutdown;
pub use server::MatchServer;
