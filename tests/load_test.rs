//! Load testing for concurrent match searches.

use std::collections::HashSet;
use std::time::Instant;

use tokio::net::TcpStream;

use waypoint_match::observability::Counter;

mod common;
use common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_drivers_never_share_a_client() {
    // 1. Start server
    let server = start_server(test_config()).await;
    let session = server.config.auth.session.clone();

    // 2. Register waiting clients, all on segment 1 -> 2
    let client_count: u16 = 40;
    let mut clients: Vec<TcpStream> = Vec::new();
    for tag in 0..client_count {
        let mut client = connect(server.addrs.client, &session).await;
        add_route(&mut client, 1, &[2], 1, 0, tag).await;
        clients.push(client);
    }

    // 3. Drivers with room for four each search at once
    let driver_count = 8;
    let start = Instant::now();
    let mut tasks = Vec::new();
    for i in 0..driver_count {
        let addr = server.addrs.driver;
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            let mut driver = connect(addr, &session).await;
            set_plan(&mut driver, &[1, 2], 4, 0, [0, i as u8]).await;
            match_search(&mut driver, 0).await;

            let head = read_n(&mut driver, 3).await;
            assert_eq!(&head[..2], &[0x22, 0x01]);
            let count = usize::from(head[2]);
            let body = read_n(&mut driver, count * 10).await;
            let tags: Vec<u16> = body
                .chunks(10)
                .map(|entry| u16::from_be_bytes([entry[8], entry[9]]))
                .collect();
            (driver, tags)
        }));
    }

    let mut seen = HashSet::new();
    let mut drivers = Vec::new();
    for task in tasks {
        let (driver, tags) = task.await.unwrap();
        assert_eq!(tags.len(), 4);
        for tag in tags {
            assert!(seen.insert(tag), "client {} offered to two drivers", tag);
        }
        drivers.push(driver);
    }
    let duration = start.elapsed();

    // 4. Every accepted client heard exactly one offer
    assert_eq!(seen.len(), driver_count * 4);
    for tag in &seen {
        let offer = read_n(&mut clients[usize::from(*tag)], 5).await;
        assert_eq!(&offer[..2], &[0x22, 0x01]);
    }
    assert_eq!(server.state.stats.get(Counter::MatchesFound), (driver_count * 4) as u64);

    println!("\n--- Load Test Results ---");
    println!("Clients:        {}", client_count);
    println!("Drivers:        {}", driver_count);
    println!("Matched:        {}", seen.len());
    println!("Total Duration: {:?}", duration);
    println!("-------------------------\n");

    // 5. Closing the drivers returns their clients to the pool
    drop(drivers);
    let clients_left = clients.len();
    let stats = server.state.stats.clone();
    eventually(|| stats.drivers.active_count() == 0).await;
    assert_eq!(server.state.stats.clients.active_count(), clients_left as u64);

    let mut late = connect(server.addrs.driver, &session).await;
    set_plan(&mut late, &[1, 2], 15, 0, [0, 0]).await;
    match_search(&mut late, 0).await;
    assert_eq!(read_n(&mut late, 3).await, vec![0x22, 0x01, 4]);

    server.stop().await;
}
