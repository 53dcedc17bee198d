//! Client → server messages.

use bytes::Buf;
use tokio::io::AsyncRead;

use super::{
    node_count, read_header, read_payload, ProtocolError, SeatTariff, OP_DESCRIPTION, OP_MATCH_STATUS,
    OP_ROUTE,
};
use crate::registry::Node;

/// Fixed part of a route add payload, before the destination list.
const ROUTE_ADD_FIXED_LEN: usize = 13;

/// A client's declared route and profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteAdd {
    pub profile: SeatTariff,
    pub position: [u8; 8],
    pub destination_index: u16,
    pub origin: Node,
    pub destinations: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMatchStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    RouteAdd(RouteAdd),
    DescriptionUpdate(SeatTariff),
    MatchStatus(ClientMatchStatus),
}

impl ClientMessage {
    /// Read the next message. `Ok(None)` on a clean close.
    pub async fn read_from<R>(reader: &mut R) -> Result<Option<Self>, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let Some(header) = read_header(reader).await? else {
            return Ok(None);
        };

        let msg = match header.opcode {
            OP_ROUTE => {
                let count = usize::from(header.flag);
                let payload = read_payload(reader, ROUTE_ADD_FIXED_LEN + 2 * count).await?;
                ClientMessage::RouteAdd(decode_route_add(&payload, count))
            }
            OP_DESCRIPTION => ClientMessage::DescriptionUpdate(SeatTariff::from_byte(header.flag)),
            OP_MATCH_STATUS => ClientMessage::MatchStatus(match header.flag {
                0x01 => ClientMatchStatus::Success,
                0x02 => ClientMatchStatus::Failure,
                other => return Err(ProtocolError::UnknownStatus(other)),
            }),
            other => return Err(ProtocolError::UnknownOpcode(other)),
        };
        Ok(Some(msg))
    }
}

/// `payload` is exactly `13 + 2 * count` bytes.
fn decode_route_add(mut payload: &[u8], count: usize) -> RouteAdd {
    let profile = SeatTariff::from_byte(payload.get_u8());
    let mut position = [0u8; 8];
    payload.copy_to_slice(&mut position);
    let destination_index = payload.get_u16();
    let origin = payload.get_u16();
    let destinations = (0..count).map(|_| payload.get_u16()).collect();

    RouteAdd {
        profile,
        position,
        destination_index,
        origin,
        destinations,
    }
}

/// Encode a route add frame. Used by tests and tooling that speak the client role.
///
/// Fails when the destination count does not fit the flag byte.
pub fn encode_route_add(route: &RouteAdd) -> Result<Vec<u8>, ProtocolError> {
    use bytes::BufMut;

    let count = node_count(route.destinations.len())?;
    let mut buf = Vec::with_capacity(2 + ROUTE_ADD_FIXED_LEN + 2 * route.destinations.len());
    buf.put_u8(OP_ROUTE);
    buf.put_u8(count);
    buf.put_u8(route.profile.to_byte());
    buf.put_slice(&route.position);
    buf.put_u16(route.destination_index);
    buf.put_u16(route.origin);
    for node in &route.destinations {
        buf.put_u16(*node);
    }
    Ok(buf)
}
