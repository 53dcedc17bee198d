//! Driver → server messages and every match-related push.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::AsyncRead;

use super::{
    node_count, read_header, read_payload, ProtocolError, SeatTariff, MATCH_FLAG_FAILED, MATCH_FLAG_OK,
    MATCH_PUSH, OP_DESCRIPTION, OP_MATCH_SEARCH, OP_MATCH_STATUS, OP_ROUTE,
};
use crate::registry::Node;

const ROUTE_PLAN_FIXED_LEN: usize = 3;

/// A driver's planned path plus the profile sent alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub profile: SeatTariff,
    pub vehicle_info: [u8; 2],
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMatchStatus {
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverMessage {
    RoutePlan(RoutePlan),
    DescriptionUpdate(SeatTariff),
    MatchSearch { sequence: u8 },
    MatchStatus(DriverMatchStatus),
}

impl DriverMessage {
    /// Read the next message. `Ok(None)` on a clean close.
    pub async fn read_from<R>(reader: &mut R) -> Result<Option<Self>, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let Some(header) = read_header(reader).await? else {
            return Ok(None);
        };

        let msg = match header.opcode {
            OP_MATCH_SEARCH => DriverMessage::MatchSearch {
                sequence: header.flag,
            },
            OP_ROUTE => {
                let count = usize::from(header.flag);
                let raw = read_payload(reader, ROUTE_PLAN_FIXED_LEN + 2 * count).await?;
                let mut payload = &raw[..];
                let profile = SeatTariff::from_byte(payload.get_u8());
                let mut vehicle_info = [0u8; 2];
                payload.copy_to_slice(&mut vehicle_info);
                let nodes = (0..count).map(|_| payload.get_u16()).collect();
                DriverMessage::RoutePlan(RoutePlan {
                    profile,
                    vehicle_info,
                    nodes,
                })
            }
            OP_DESCRIPTION => DriverMessage::DescriptionUpdate(SeatTariff::from_byte(header.flag)),
            OP_MATCH_STATUS => DriverMessage::MatchStatus(match header.flag {
                0x01 => DriverMatchStatus::Confirm,
                0x02 => DriverMatchStatus::Cancel,
                other => return Err(ProtocolError::UnknownStatus(other)),
            }),
            other => return Err(ProtocolError::UnknownOpcode(other)),
        };
        Ok(Some(msg))
    }
}

/// One accepted client as reported to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchEntry {
    pub position: [u8; 8],
    pub destination_index: u16,
}

/// `22 01 count (position[8] destination[2])*` sent to the driver.
///
/// A round never exceeds four clients, so the count always fits.
pub fn encode_match_list(entries: &[MatchEntry]) -> BytesMut {
    debug_assert!(entries.len() <= usize::from(u8::MAX));
    let mut buf = BytesMut::with_capacity(3 + entries.len() * 10);
    buf.put_u8(MATCH_PUSH);
    buf.put_u8(MATCH_FLAG_OK);
    buf.put_u8(entries.len() as u8);
    for entry in entries {
        buf.put_slice(&entry.position);
        buf.put_u16(entry.destination_index);
    }
    buf
}

/// `22 01 tariff vehicle[2]` pushed to a matched client.
pub fn encode_offer(tariff: u8, vehicle_info: [u8; 2]) -> [u8; 5] {
    [
        MATCH_PUSH,
        MATCH_FLAG_OK,
        tariff,
        vehicle_info[0],
        vehicle_info[1],
    ]
}

/// `22 02 index` reported to the driver when an offer could not be delivered.
pub fn encode_delivery_failure(round_index: u8) -> [u8; 3] {
    [MATCH_PUSH, MATCH_FLAG_FAILED, round_index]
}

/// `22 02` pushed to a client whose match the driver cancelled.
pub const ABORT: [u8; 2] = [MATCH_PUSH, MATCH_FLAG_FAILED];

/// Encode a route plan frame. Used by tests and tooling that speak the driver role.
///
/// Fails when the plan has more nodes than the flag byte can count.
pub fn encode_route_plan(plan: &RoutePlan) -> Result<Vec<u8>, ProtocolError> {
    let count = node_count(plan.nodes.len())?;
    let mut buf = Vec::with_capacity(2 + ROUTE_PLAN_FIXED_LEN + 2 * plan.nodes.len());
    buf.put_u8(OP_ROUTE);
    buf.put_u8(count);
    buf.put_u8(plan.profile.to_byte());
    buf.put_slice(&plan.vehicle_info);
    for node in &plan.nodes {
        buf.put_u16(*node);
    }
    Ok(buf)
}
