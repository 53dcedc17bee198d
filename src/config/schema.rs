//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the matcher.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the matching service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MatcherConfig {
    /// Listen addresses for the three protocols.
    pub listener: ListenerConfig,

    /// Per-role connection limits.
    pub limits: LimitsConfig,

    /// Handshake parameters.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Client protocol bind address (e.g., "0.0.0.0:7001").
    pub client_address: String,

    /// Driver protocol bind address.
    pub driver_address: String,

    /// Admin protocol bind address.
    pub admin_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            client_address: "0.0.0.0:7001".to_string(),
            driver_address: "0.0.0.0:7002".to_string(),
            admin_address: "127.0.0.1:7003".to_string(),
        }
    }
}

/// Connection limits, checked at accept time.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrently connected clients.
    pub max_clients: u64,

    /// Maximum concurrently connected drivers.
    pub max_drivers: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_clients: 1_000_000,
            max_drivers: 500_000,
        }
    }
}

/// Handshake policies for both protocol families.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared by the client and driver ports.
    pub session: HandshakeConfig,

    /// Admin port.
    pub admin: HandshakeConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session: HandshakeConfig {
                protocol_version: 0x01,
                key: "f1e5b827df613927114b317a2a91ce79".to_string(),
                code: 0x2D08_2E4C_D333_9301,
                timestamp_tolerance_secs: 180,
                idle_timeout_secs: 120 * 60,
            },
            admin: HandshakeConfig {
                protocol_version: 0x0A,
                key: "a8fa0803de6cf625b1d5b9911da556d6".to_string(),
                code: 0x105F_218E_5BFE_C13E,
                timestamp_tolerance_secs: 60,
                idle_timeout_secs: 24 * 60 * 60,
            },
        }
    }
}

/// One handshake policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandshakeConfig {
    /// Expected first byte of the handshake.
    pub protocol_version: u8,

    /// AES-128 key, 32 hex characters.
    pub key: String,

    /// Expected 64-bit code inside the decrypted block.
    pub code: u64,

    /// Accepted clock skew in either direction.
    pub timestamp_tolerance_secs: u32,

    /// Absolute deadline after a successful handshake.
    pub idle_timeout_secs: u64,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: MatcherConfig = toml::from_str("").unwrap();
        assert_eq!(config.limits.max_clients, 1_000_000);
        assert_eq!(config.limits.max_drivers, 500_000);
        assert_eq!(config.auth.session.protocol_version, 1);
        assert_eq!(config.auth.admin.protocol_version, 0x0A);
        assert_eq!(config.auth.session.idle_timeout_secs, 7200);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: MatcherConfig = toml::from_str(
            r#"
            [listener]
            client_address = "127.0.0.1:0"

            [limits]
            max_clients = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.client_address, "127.0.0.1:0");
        assert_eq!(config.listener.driver_address, "0.0.0.0:7002");
        assert_eq!(config.limits.max_clients, 1);
        assert_eq!(config.limits.max_drivers, 500_000);
    }
}
