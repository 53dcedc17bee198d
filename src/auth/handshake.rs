//! Encrypted connection handshake.
//!
//! Frame layout (17 bytes):
//! ```text
//! [version u8][AES-128 block: code u64 BE | timestamp u32 BE | padding 4]
//! ```
//! The block is a single CBC block under a zero IV, i.e. a raw block
//! decryption.

use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use super::AuthError;
use crate::config::HandshakeConfig;
use crate::protocol::{REPLY_TIMESTAMP_ERROR, REPLY_VERSION_ERROR};

pub const HANDSHAKE_LEN: usize = 17;

/// How long an accepted socket may take to send its handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Validated parameters for one protocol family.
#[derive(Clone)]
pub struct HandshakePolicy {
    version: u8,
    cipher: Aes128,
    code: u64,
    tolerance_secs: u32,
    idle_timeout: Duration,
}

impl HandshakePolicy {
    pub fn new(version: u8, key: [u8; 16], code: u64, tolerance_secs: u32, idle_timeout: Duration) -> Self {
        Self {
            version,
            cipher: Aes128::new(GenericArray::from_slice(&key)),
            code,
            tolerance_secs,
            idle_timeout,
        }
    }

    pub fn from_config(config: &HandshakeConfig) -> Result<Self, AuthError> {
        let key: [u8; 16] = hex::decode(&config.key)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(AuthError::InvalidKey)?;
        Ok(Self::new(
            config.protocol_version,
            key,
            config.code,
            config.timestamp_tolerance_secs,
            Duration::from_secs(config.idle_timeout_secs),
        ))
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Check a complete handshake frame against this policy at `now`
    /// (unix seconds).
    pub fn verify(&self, frame: &[u8; HANDSHAKE_LEN], now: u32) -> Result<(), AuthError> {
        if frame[0] != self.version {
            return Err(AuthError::VersionMismatch {
                expected: self.version,
                received: frame[0],
            });
        }

        let mut block = GenericArray::clone_from_slice(&frame[1..]);
        self.cipher.decrypt_block(&mut block);

        let mut code = [0u8; 8];
        code.copy_from_slice(&block[..8]);
        if u64::from_be_bytes(code) != self.code {
            return Err(AuthError::BadCode);
        }

        let mut stamp = [0u8; 4];
        stamp.copy_from_slice(&block[8..12]);
        let stamp = u32::from_be_bytes(stamp);
        let skew = i64::from(stamp) - i64::from(now);
        if skew.unsigned_abs() > u64::from(self.tolerance_secs) {
            return Err(AuthError::StaleTimestamp { skew_secs: skew });
        }
        Ok(())
    }

    /// Build a handshake frame that this policy accepts at `timestamp`.
    pub fn seal(&self, timestamp: u32) -> [u8; HANDSHAKE_LEN] {
        seal_with(&self.cipher, self.version, self.code, timestamp)
    }
}

impl std::fmt::Debug for HandshakePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakePolicy")
            .field("version", &self.version)
            .field("tolerance_secs", &self.tolerance_secs)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

/// Build a handshake frame from raw parameters.
pub fn seal_handshake(version: u8, key: [u8; 16], code: u64, timestamp: u32) -> [u8; HANDSHAKE_LEN] {
    let cipher = Aes128::new(GenericArray::from_slice(&key));
    seal_with(&cipher, version, code, timestamp)
}

fn seal_with(cipher: &Aes128, version: u8, code: u64, timestamp: u32) -> [u8; HANDSHAKE_LEN] {
    let mut plain = [0u8; 16];
    plain[..8].copy_from_slice(&code.to_be_bytes());
    plain[8..12].copy_from_slice(&timestamp.to_be_bytes());

    let mut block = GenericArray::clone_from_slice(&plain);
    cipher.encrypt_block(&mut block);

    let mut frame = [0u8; HANDSHAKE_LEN];
    frame[0] = version;
    frame[1..].copy_from_slice(&block);
    frame
}

pub fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Runs the handshake on freshly accepted connections.
#[derive(Debug, Clone)]
pub struct Authenticator {
    policy: HandshakePolicy,
}

impl Authenticator {
    pub fn new(policy: HandshakePolicy) -> Self {
        Self { policy }
    }

    #[cfg(test)]
    pub(crate) fn policy(&self) -> &HandshakePolicy {
        &self.policy
    }

    /// Read and verify the handshake, writing the error reply where the
    /// protocol defines one.
    ///
    /// On success returns the absolute idle deadline for the session.
    pub async fn authenticate<S>(&self, stream: &mut S) -> Result<Instant, AuthError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut frame = [0u8; HANDSHAKE_LEN];
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.read_exact(&mut frame)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(AuthError::Io(e)),
            Err(_) => return Err(AuthError::Timeout),
        }

        let verdict = self.policy.verify(&frame, unix_now());
        if let Err(err) = &verdict {
            if let Some(reply) = err.reply() {
                // The connection is closed right after; a failed write changes nothing.
                let _ = write_reply(stream, &reply).await;
            }
        }
        verdict.map(|()| Instant::now() + self.policy.idle_timeout)
    }
}

async fn write_reply<S>(stream: &mut S, reply: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(reply).await?;
    stream.flush().await
}

impl AuthError {
    /// Reply owed to the peer before closing, if any.
    pub fn reply(&self) -> Option<[u8; 2]> {
        match self {
            AuthError::VersionMismatch { .. } => Some(REPLY_VERSION_ERROR),
            AuthError::StaleTimestamp { .. } => Some(REPLY_TIMESTAMP_ERROR),
            _ => None,
        }
    }
}
