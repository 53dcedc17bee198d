//! Asynchronous notification of matched clients.
//!
//! Each delivery runs in its own task and touches only the target client's
//! connection, the driver's connection and a round index. The registry is
//! never consulted, so a slow or dead client cannot stall the driver.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::net::PeerLink;
use crate::observability::metrics::record_delivery_failure;
use crate::protocol::driver::{encode_delivery_failure, encode_offer, ABORT};
use crate::registry::ClientRecord;

/// Send the match offer to every client of a round.
///
/// A failed offer is reported to the driver as `22 02 index` and the client's
/// read deadline is released.
pub fn deliver_offers(
    driver: &Arc<PeerLink>,
    clients: &[Arc<ClientRecord>],
    tariff: u8,
    vehicle_info: [u8; 2],
) -> Vec<JoinHandle<()>> {
    let offer = encode_offer(tariff, vehicle_info);
    clients
        .iter()
        .enumerate()
        .map(|(index, client)| {
            let driver = Arc::clone(driver);
            let target = Arc::clone(client.link());
            tokio::spawn(async move {
                let Err(e) = target.send(&offer).await else {
                    return;
                };
                tracing::debug!(
                    client = %target.id(),
                    driver = %driver.id(),
                    index,
                    error = %e,
                    "Offer delivery failed"
                );
                record_delivery_failure("offer");
                if let Err(e) = driver.send(&encode_delivery_failure(index as u8)).await {
                    tracing::debug!(driver = %driver.id(), error = %e, "Failure report not delivered");
                }
                target.release_deadline();
            })
        })
        .collect()
}

/// Tell every client of a cancelled round that the match is off.
pub fn deliver_aborts(clients: &[Arc<ClientRecord>]) -> Vec<JoinHandle<()>> {
    clients
        .iter()
        .map(|client| {
            let target = Arc::clone(client.link());
            tokio::spawn(async move {
                if let Err(e) = target.send(&ABORT).await {
                    tracing::debug!(client = %target.id(), error = %e, "Abort delivery failed");
                    record_delivery_failure("abort");
                    target.release_deadline();
                }
            })
        })
        .collect()
}
