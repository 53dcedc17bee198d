//! Shared helpers for the integration tests: an in-process server on
//! ephemeral ports and small wire-level clients.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use waypoint_match::auth::{unix_now, HandshakePolicy};
use waypoint_match::config::HandshakeConfig;
use waypoint_match::protocol::client::encode_route_add;
use waypoint_match::protocol::driver::encode_route_plan;
use waypoint_match::protocol::{RouteAdd, RoutePlan, SeatTariff, REPLY_ACK};
use waypoint_match::registry::Node;
use waypoint_match::server::{AppState, BoundAddrs, ServerError};
use waypoint_match::{MatchServer, MatcherConfig, Shutdown};

/// Upper bound on any single wait in these tests.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addrs: BoundAddrs,
    pub state: AppState,
    pub config: MatcherConfig,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Stop the accept loops and wait for them.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let result = tokio::time::timeout(STEP_TIMEOUT, self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked");
        assert!(result.is_ok());
    }
}

/// Default configuration with every port ephemeral.
pub fn test_config() -> MatcherConfig {
    let mut config = MatcherConfig::default();
    config.listener.client_address = "127.0.0.1:0".into();
    config.listener.driver_address = "127.0.0.1:0".into();
    config.listener.admin_address = "127.0.0.1:0".into();
    config
}

pub async fn start_server(config: MatcherConfig) -> TestServer {
    let server = MatchServer::bind(&config).await.expect("bind failed");
    let addrs = server.local_addrs().unwrap();
    let state = server.state().clone();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(shutdown.subscribe()));

    TestServer {
        addrs,
        state,
        config,
        shutdown,
        handle,
    }
}

/// Handshake frame accepted by `policy` right now.
pub fn handshake(policy: &HandshakeConfig) -> [u8; 17] {
    HandshakePolicy::from_config(policy).unwrap().seal(unix_now())
}

/// Connect and send a raw handshake frame.
pub async fn connect_with(addr: std::net::SocketAddr, frame: &[u8]) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(frame).await.unwrap();
    stream
}

/// Connect and authenticate. Success has no reply of its own.
pub async fn connect(addr: std::net::SocketAddr, policy: &HandshakeConfig) -> TcpStream {
    connect_with(addr, &handshake(policy)).await
}

pub async fn read_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(STEP_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for reply")
        .unwrap();
    buf
}

/// Everything the server sends until it closes the connection.
pub async fn read_until_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    tokio::time::timeout(STEP_TIMEOUT, stream.read_to_end(&mut buf))
        .await
        .expect("connection was not closed")
        .unwrap_or_default();
    buf
}

pub async fn expect_ack(stream: &mut TcpStream) {
    assert_eq!(read_n(stream, 2).await, REPLY_ACK);
}

/// Register a route and wait for its acknowledgement. `tag` becomes the
/// destination index and fills the position bytes.
pub async fn add_route(stream: &mut TcpStream, origin: Node, destinations: &[Node], seats: u8, tariff: u8, tag: u16) {
    let frame = encode_route_add(&RouteAdd {
        profile: SeatTariff::new(seats, tariff),
        position: [tag as u8; 8],
        destination_index: tag,
        origin,
        destinations: destinations.to_vec(),
    })
    .unwrap();
    stream.write_all(&frame).await.unwrap();
    expect_ack(stream).await;
}

/// Send a route plan and wait for its acknowledgement.
pub async fn set_plan(stream: &mut TcpStream, nodes: &[Node], seats: u8, tariff: u8, vehicle_info: [u8; 2]) {
    let frame = encode_route_plan(&RoutePlan {
        profile: SeatTariff::new(seats, tariff),
        vehicle_info,
        nodes: nodes.to_vec(),
    })
    .unwrap();
    stream.write_all(&frame).await.unwrap();
    expect_ack(stream).await;
}

pub async fn match_search(stream: &mut TcpStream, sequence: u8) {
    stream.write_all(&[0x14, sequence]).await.unwrap();
}

/// Poll `check` until it holds or the step timeout elapses.
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition never held");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
