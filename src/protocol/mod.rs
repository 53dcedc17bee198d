//! Binary wire protocol.
//!
//! # Framing
//! ```text
//! [opcode:1][flag:1]                     fixed header
//! [payload: opcode-specific length]      read as one block when present
//! ```
//! All multi-byte integers are big-endian.
//!
//! # Design Decisions
//! - Decoding is pure over `AsyncRead`; sessions own all side effects
//! - End of stream exactly at a message boundary is a clean close, anything
//!   else that fails to decode is a protocol violation
//! - Replies are built into `BytesMut` and written with one `write_all`

pub mod admin;
pub mod client;
pub mod driver;

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

pub use client::{ClientMatchStatus, ClientMessage, RouteAdd};
pub use driver::{DriverMatchStatus, DriverMessage, RoutePlan};

/// Route add (client) / route plan set (driver).
pub const OP_ROUTE: u8 = 0x11;
/// Seat/tariff description update.
pub const OP_DESCRIPTION: u8 = 0x12;
/// Match status report.
pub const OP_MATCH_STATUS: u8 = 0x13;
/// Driver match search.
pub const OP_MATCH_SEARCH: u8 = 0x14;

/// Acknowledgment for a route add / plan set.
pub const REPLY_ACK: [u8; 2] = [0x21, 0x01];
/// Connection limit reached.
pub const REPLY_BUSY: [u8; 2] = [0x50, 0x01];
/// Handshake protocol version mismatch.
pub const REPLY_VERSION_ERROR: [u8; 2] = [0x40, 0x01];
/// Handshake timestamp outside the accepted window.
pub const REPLY_TIMESTAMP_ERROR: [u8; 2] = [0x40, 0x02];

/// Opcode of every match-related push.
pub const MATCH_PUSH: u8 = 0x22;
pub const MATCH_FLAG_OK: u8 = 0x01;
pub const MATCH_FLAG_FAILED: u8 = 0x02;

/// Errors produced while decoding a session message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("unknown match status {0:#04x}")]
    UnknownStatus(u8),

    #[error("{0} nodes do not fit in one frame")]
    TooManyNodes(usize),
}

/// The fixed two-byte message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: u8,
    pub flag: u8,
}

/// Read one header. `Ok(None)` means the peer closed cleanly between messages.
pub async fn read_header<R>(reader: &mut R) -> Result<Option<Header>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 2];
    let n = reader.read(&mut buf).await?;
    match n {
        0 => return Ok(None),
        1 => {
            reader.read_exact(&mut buf[1..]).await?;
        }
        _ => {}
    }
    Ok(Some(Header {
        opcode: buf[0],
        flag: buf[1],
    }))
}

/// Read exactly `len` payload bytes.
pub async fn read_payload<R>(reader: &mut R, len: usize) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Node count for a frame's flag byte.
pub(crate) fn node_count(len: usize) -> Result<u8, ProtocolError> {
    u8::try_from(len).map_err(|_| ProtocolError::TooManyNodes(len))
}

/// Seat count (low nibble) and tariff class (high nibble) packed in one byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeatTariff {
    pub seats: u8,
    pub tariff: u8,
}

impl SeatTariff {
    pub fn new(seats: u8, tariff: u8) -> Self {
        Self {
            seats: seats & 0x0F,
            tariff: tariff & 0x0F,
        }
    }

    pub fn from_byte(b: u8) -> Self {
        Self {
            seats: b & 0x0F,
            tariff: b >> 4,
        }
    }

    pub fn to_byte(self) -> u8 {
        (self.tariff << 4) | (self.seats & 0x0F)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_tariff_nibbles() {
        let st = SeatTariff::from_byte(0x21);
        assert_eq!(st.seats, 1);
        assert_eq!(st.tariff, 2);
        assert_eq!(st.to_byte(), 0x21);
        assert_eq!(SeatTariff::new(0x1F, 0x13), SeatTariff::new(15, 3));
    }

    #[tokio::test]
    async fn header_eof_is_clean_close() {
        let mut empty: &[u8] = &[];
        assert!(read_header(&mut empty).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn header_split_across_reads() {
        let (mut tx, mut rx) = tokio::io::duplex(8);
        let reader = tokio::spawn(async move { read_header(&mut rx).await });
        tokio::io::AsyncWriteExt::write_all(&mut tx, &[0x12]).await.unwrap();
        tokio::task::yield_now().await;
        tokio::io::AsyncWriteExt::write_all(&mut tx, &[0x34]).await.unwrap();
        let header = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(header, Header { opcode: 0x12, flag: 0x34 });
    }

    #[tokio::test]
    async fn truncated_payload_is_an_error() {
        let mut short: &[u8] = &[1, 2, 3];
        assert!(matches!(
            read_payload(&mut short, 5).await,
            Err(ProtocolError::Io(_))
        ));
    }
}
