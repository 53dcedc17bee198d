//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Listen addresses parse and do not collide
//! - Handshake keys decode to 16 bytes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MatcherConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::{HandshakeConfig, MatcherConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: address {value} is already used by another listener")]
    DuplicateAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: expected 32 hex characters for an AES-128 key")]
    InvalidKey { field: &'static str },

    #[error("auth.session and auth.admin must use different protocol versions")]
    SharedProtocolVersion,

    #[error("observability.log_level: unknown level {0:?}")]
    UnknownLogLevel(String),
}

pub fn validate_config(config: &MatcherConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let addresses = [
        ("listener.client_address", &config.listener.client_address),
        ("listener.driver_address", &config.listener.driver_address),
        ("listener.admin_address", &config.listener.admin_address),
    ];
    let mut seen = HashSet::new();
    for (field, value) in addresses {
        match value.parse::<SocketAddr>() {
            // Port 0 binds an ephemeral port, never a collision.
            Ok(addr) if addr.port() != 0 && !seen.insert(addr) => {
                errors.push(ValidationError::DuplicateAddress {
                    field,
                    value: value.clone(),
                });
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::InvalidAddress {
                field,
                value: value.clone(),
            }),
        }
    }

    if config.limits.max_clients == 0 {
        errors.push(ValidationError::Zero {
            field: "limits.max_clients",
        });
    }
    if config.limits.max_drivers == 0 {
        errors.push(ValidationError::Zero {
            field: "limits.max_drivers",
        });
    }

    check_handshake(
        &config.auth.session,
        ("auth.session.key", "auth.session.idle_timeout_secs"),
        &mut errors,
    );
    check_handshake(
        &config.auth.admin,
        ("auth.admin.key", "auth.admin.idle_timeout_secs"),
        &mut errors,
    );
    if config.auth.session.protocol_version == config.auth.admin.protocol_version {
        errors.push(ValidationError::SharedProtocolVersion);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_handshake(
    handshake: &HandshakeConfig,
    fields: (&'static str, &'static str),
    errors: &mut Vec<ValidationError>,
) {
    let (key_field, idle_field) = fields;
    let key_ok = matches!(hex::decode(&handshake.key), Ok(bytes) if bytes.len() == 16);
    if !key_ok {
        errors.push(ValidationError::InvalidKey { field: key_field });
    }
    if handshake.idle_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: idle_field });
    }
}
