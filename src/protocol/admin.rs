//! Administrative telemetry protocol.
//!
//! ```text
//! request:  [magic 0x47][command][length]
//! snapshot: [0x20][command][total length][uvarint × 12]
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::ProtocolError;
use crate::observability::StatsSnapshot;

pub const REQUEST_MAGIC: u8 = 0x47;
pub const RESPONSE_MAGIC: u8 = 0x20;
pub const CMD_SNAPSHOT: u8 = 0x01;

/// Largest possible snapshot frame: header plus twelve 10-byte varints.
pub const MAX_SNAPSHOT_LEN: usize = 3 + StatsSnapshot::FIELD_COUNT * 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRequest {
    Snapshot,
}

#[derive(Debug, thiserror::Error)]
pub enum AdminDecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("handshake rejected with {0:#04x} {1:#04x}")]
    Rejected(u8, u8),
    #[error("bad response magic {0:#04x}")]
    BadMagic(u8),
    #[error("declared length {declared} does not match frame length {actual}")]
    Length { declared: usize, actual: usize },
    #[error("truncated varint")]
    Truncated,
}

impl AdminRequest {
    /// Read one request. `Ok(None)` on a clean close.
    pub async fn read_from<R>(reader: &mut R) -> Result<Option<Self>, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; 3];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        reader.read_exact(&mut buf[n..]).await?;
        if buf[0] != REQUEST_MAGIC {
            return Err(ProtocolError::UnknownOpcode(buf[0]));
        }
        match buf[1] {
            CMD_SNAPSHOT => Ok(Some(AdminRequest::Snapshot)),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }

    pub fn encode(self) -> [u8; 3] {
        match self {
            AdminRequest::Snapshot => [REQUEST_MAGIC, CMD_SNAPSHOT, 3],
        }
    }
}

/// Encode the counters snapshot reply.
pub fn encode_snapshot(snapshot: &StatsSnapshot) -> BytesMut {
    let mut buf = BytesMut::with_capacity(MAX_SNAPSHOT_LEN);
    buf.put_u8(RESPONSE_MAGIC);
    buf.put_u8(CMD_SNAPSHOT);
    buf.put_u8(0);
    for value in snapshot.to_fields() {
        put_uvarint(&mut buf, value);
    }
    let len = buf.len() as u8;
    buf[2] = len;
    buf
}

/// Decode a complete snapshot frame as produced by [`encode_snapshot`].
pub fn decode_snapshot(frame: &[u8]) -> Result<StatsSnapshot, AdminDecodeError> {
    if frame.len() < 3 {
        return Err(AdminDecodeError::Truncated);
    }
    if frame[0] != RESPONSE_MAGIC {
        return Err(AdminDecodeError::BadMagic(frame[0]));
    }
    let declared = usize::from(frame[2]);
    if declared != frame.len() {
        return Err(AdminDecodeError::Length {
            declared,
            actual: frame.len(),
        });
    }

    let mut body = &frame[3..];
    let mut fields = [0u64; StatsSnapshot::FIELD_COUNT];
    for field in fields.iter_mut() {
        *field = get_uvarint(&mut body).ok_or(AdminDecodeError::Truncated)?;
    }
    Ok(StatsSnapshot::from_fields(fields))
}

/// Read one snapshot reply from `reader`.
///
/// A handshake error reply (`40 xx`) arriving instead is reported as
/// [`AdminDecodeError::Rejected`].
pub async fn read_snapshot<R>(reader: &mut R) -> Result<StatsSnapshot, AdminDecodeError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 2];
    reader.read_exact(&mut head).await?;
    if head[0] == 0x40 {
        return Err(AdminDecodeError::Rejected(head[0], head[1]));
    }

    let total = usize::from(reader.read_u8().await?);
    if total < 3 {
        return Err(AdminDecodeError::Length {
            declared: total,
            actual: 3,
        });
    }
    let mut frame = vec![0u8; total];
    frame[..2].copy_from_slice(&head);
    frame[2] = total as u8;
    reader.read_exact(&mut frame[3..]).await?;
    decode_snapshot(&frame)
}

/// Unsigned LEB128.
pub fn put_uvarint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

pub fn get_uvarint(buf: &mut impl Buf) -> Option<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        if !buf.has_remaining() {
            return None;
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}
