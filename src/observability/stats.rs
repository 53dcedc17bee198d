//! Process-wide matching statistics.
//!
//! Counters are plain atomics; nothing in the core ever branches on them.
//! Every increment is mirrored to the `metrics` facade so a Prometheus
//! exporter, when installed, sees the same numbers the admin channel reports.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::net::connection::ConnectionTracker;

/// Monotonic event counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    ClientAuthSucceeded,
    ClientAuthFailed,
    ClientFailedPackets,
    DriverAuthSucceeded,
    DriverAuthFailed,
    DriverFailedPackets,
    ClientFailedMatches,
    MatchesFound,
    MatchesSucceeded,
    DriverCancelledMatches,
}

impl Counter {
    const COUNT: usize = 10;

    fn index(self) -> usize {
        self as usize
    }

    /// Metric name exported through the `metrics` facade.
    pub fn metric_name(self) -> &'static str {
        match self {
            Counter::ClientAuthSucceeded => "waypoint_client_auth_succeeded_total",
            Counter::ClientAuthFailed => "waypoint_client_auth_failed_total",
            Counter::ClientFailedPackets => "waypoint_client_failed_packets_total",
            Counter::DriverAuthSucceeded => "waypoint_driver_auth_succeeded_total",
            Counter::DriverAuthFailed => "waypoint_driver_auth_failed_total",
            Counter::DriverFailedPackets => "waypoint_driver_failed_packets_total",
            Counter::ClientFailedMatches => "waypoint_client_failed_matches_total",
            Counter::MatchesFound => "waypoint_matches_found_total",
            Counter::MatchesSucceeded => "waypoint_matches_succeeded_total",
            Counter::DriverCancelledMatches => "waypoint_driver_cancelled_matches_total",
        }
    }
}

/// Shared statistics object, constructed once and passed by `Arc`.
#[derive(Debug)]
pub struct Stats {
    /// Live authenticated-or-authenticating client connections.
    pub clients: ConnectionTracker,
    /// Live driver connections.
    pub drivers: ConnectionTracker,
    counters: [AtomicU64; Counter::COUNT],
}

impl Stats {
    pub fn new(max_clients: u64, max_drivers: u64) -> Self {
        Self {
            clients: ConnectionTracker::new(max_clients, "waypoint_clients_connected"),
            drivers: ConnectionTracker::new(max_drivers, "waypoint_drivers_connected"),
            counters: Default::default(),
        }
    }

    /// Add one to `counter`.
    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        self.counters[counter.index()].fetch_add(n, Ordering::Relaxed);
        metrics::counter!(counter.metric_name()).increment(n);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter and gauge.
    ///
    /// The connected gauges count slots reserved at accept time, so they
    /// include connections still sending their handshake. Individual loads
    /// are not taken atomically together; the snapshot is for telemetry only.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            clients_connected: self.clients.active_count(),
            drivers_connected: self.drivers.active_count(),
            client_auth_succeeded: self.get(Counter::ClientAuthSucceeded),
            client_auth_failed: self.get(Counter::ClientAuthFailed),
            client_failed_packets: self.get(Counter::ClientFailedPackets),
            driver_auth_succeeded: self.get(Counter::DriverAuthSucceeded),
            driver_auth_failed: self.get(Counter::DriverAuthFailed),
            driver_failed_packets: self.get(Counter::DriverFailedPackets),
            client_failed_matches: self.get(Counter::ClientFailedMatches),
            matches_found: self.get(Counter::MatchesFound),
            matches_succeeded: self.get(Counter::MatchesSucceeded),
            driver_cancelled_matches: self.get(Counter::DriverCancelledMatches),
        }
    }
}

/// Counter values in the fixed order used on the admin wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Includes connections that have not finished authenticating.
    pub clients_connected: u64,
    /// Includes connections that have not finished authenticating.
    pub drivers_connected: u64,
    pub client_auth_succeeded: u64,
    pub client_auth_failed: u64,
    pub client_failed_packets: u64,
    pub driver_auth_succeeded: u64,
    pub driver_auth_failed: u64,
    pub driver_failed_packets: u64,
    pub client_failed_matches: u64,
    pub matches_found: u64,
    pub matches_succeeded: u64,
    pub driver_cancelled_matches: u64,
}

impl StatsSnapshot {
    pub const FIELD_COUNT: usize = 12;

    /// Values in wire order.
    pub fn to_fields(&self) -> [u64; Self::FIELD_COUNT] {
        [
            self.clients_connected,
            self.drivers_connected,
            self.client_auth_succeeded,
            self.client_auth_failed,
            self.client_failed_packets,
            self.driver_auth_succeeded,
            self.driver_auth_failed,
            self.driver_failed_packets,
            self.client_failed_matches,
            self.matches_found,
            self.matches_succeeded,
            self.driver_cancelled_matches,
        ]
    }

    pub fn from_fields(f: [u64; Self::FIELD_COUNT]) -> Self {
        Self {
            clients_connected: f[0],
            drivers_connected: f[1],
            client_auth_succeeded: f[2],
            client_auth_failed: f[3],
            client_failed_packets: f[4],
            driver_auth_succeeded: f[5],
            driver_auth_failed: f[6],
            driver_failed_packets: f[7],
            client_failed_matches: f[8],
            matches_found: f[9],
            matches_succeeded: f[10],
            driver_cancelled_matches: f[11],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent() {
        let stats = Stats::new(10, 10);
        stats.incr(Counter::MatchesFound);
        stats.add(Counter::MatchesFound, 2);
        stats.incr(Counter::ClientAuthFailed);

        assert_eq!(stats.get(Counter::MatchesFound), 3);
        assert_eq!(stats.get(Counter::ClientAuthFailed), 1);
        assert_eq!(stats.get(Counter::MatchesSucceeded), 0);
    }

    #[test]
    fn snapshot_includes_connection_gauges() {
        let stats = Stats::new(10, 10);
        let _c = stats.clients.try_track().unwrap();
        let _d1 = stats.drivers.try_track().unwrap();
        let _d2 = stats.drivers.try_track().unwrap();
        stats.incr(Counter::DriverCancelledMatches);

        let snap = stats.snapshot();
        assert_eq!(snap.clients_connected, 1);
        assert_eq!(snap.drivers_connected, 2);
        assert_eq!(snap.driver_cancelled_matches, 1);
    }

    #[test]
    fn field_order_is_stable() {
        let snap = StatsSnapshot {
            clients_connected: 1,
            drivers_connected: 2,
            matches_found: 10,
            driver_cancelled_matches: 12,
            ..Default::default()
        };
        let fields = snap.to_fields();
        assert_eq!(fields[0], 1);
        assert_eq!(fields[1], 2);
        assert_eq!(fields[9], 10);
        assert_eq!(fields[11], 12);
        assert_eq!(StatsSnapshot::from_fields(fields), snap);
    }
}
