use std::{sync::Arc, time::Duration};

use ballot_network::{
    Connection, ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionStatus,
    EndpointError,
};
use ballot_network_mock::MockHub;
use ballot_test_log::test;
use ballot_utils::Resource;
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

const A: &str = "wss://a.example";
const B: &str = "wss://b.example";

const WAIT: Duration = Duration::from_secs(60);

fn connection(hub: &MockHub, endpoints: &[&str]) -> Connection {
    Connection::new(
        endpoints,
        Arc::new(hub.provider()),
        ConnectionConfig::default(),
    )
    .unwrap()
}

async fn next_event(events: &mut BroadcastStream<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(WAIT, events.next())
        .await
        .expect("no event in time")
        .expect("event stream ended")
        .expect("event stream lagged")
}

#[test(tokio::test(start_paused = true))]
async fn rejects_invalid_endpoints_before_dialing() {
    let hub = MockHub::new();
    let result = Connection::new(
        &["http://a.example", A, "b.example"],
        Arc::new(hub.provider()),
        ConnectionConfig::default(),
    );

    let Err(ConnectionError::Endpoint(EndpointError::Invalid(invalid))) = result else {
        panic!("endpoints should have been rejected");
    };
    assert_eq!(invalid.len(), 2);
    assert_eq!(hub.connects(A), 0);
}

#[test(tokio::test(start_paused = true))]
async fn rotates_past_unreachable_endpoint() {
    let hub = MockHub::new();
    hub.set_unreachable(A, true);
    let connection = connection(&hub, &[A, B]);

    connection.connect();
    let endpoint = connection.wait_connected(WAIT).await.unwrap();

    assert_eq!(endpoint, B);
    assert_eq!(connection.current_endpoint().as_deref(), Some(B));
    assert_eq!(hub.connects(A), 0);
    assert_eq!(connection.stats().failed_attempts, 1);
}

#[test(tokio::test(start_paused = true))]
async fn forwards_blocks_from_current_transport() {
    let hub = MockHub::new();
    let connection = connection(&hub, &[A]);
    let mut blocks = connection.subscribe_new_blocks();

    connection.connect();
    connection.wait_connected(WAIT).await.unwrap();
    hub.produce_block();
    hub.produce_block();

    assert_eq!(blocks.next().await, Some(1));
    assert_eq!(blocks.next().await, Some(2));
    assert_eq!(connection.stats().blocks, 2);
}

#[test(tokio::test(start_paused = true))]
async fn reconnects_to_next_endpoint_after_transport_error() {
    let hub = MockHub::new();
    let connection = connection(&hub, &[A, B]);
    let mut events = connection.subscribe_events();

    connection.connect();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected(A.to_owned()));

    hub.drop_connections("reset by peer");
    let ConnectionEvent::Disconnected { endpoint, reason } = next_event(&mut events).await else {
        panic!("expected a disconnect");
    };
    assert_eq!(endpoint, A);
    assert!(reason.contains("reset by peer"));

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected(B.to_owned()));
    assert_eq!(connection.stats().connects, 2);
}

#[test(tokio::test(start_paused = true))]
async fn stalled_transport_is_replaced() {
    let hub = MockHub::new();
    let connection = connection(&hub, &[A, B]);
    let mut events = connection.subscribe_events();

    connection.connect();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected(A.to_owned()));
    hub.stall_connections();

    let start = tokio::time::Instant::now();
    let ConnectionEvent::Disconnected { reason, .. } = next_event(&mut events).await else {
        panic!("expected a disconnect");
    };
    assert!(reason.contains("no data"));
    // Six checks without data at a five second interval.
    assert_eq!(start.elapsed(), Duration::from_secs(30));
    assert_eq!(connection.stats().stalls, 1);

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected(B.to_owned()));
}

#[test(tokio::test(start_paused = true))]
async fn steady_blocks_keep_transport_alive() {
    let hub = MockHub::new();
    let connection = connection(&hub, &[A, B]);

    connection.connect();
    connection.wait_connected(WAIT).await.unwrap();
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_secs(4)).await;
        hub.produce_block();
    }

    assert_eq!(hub.connects(A), 1);
    assert_eq!(hub.connects(B), 0);
    assert_eq!(connection.stats().stalls, 0);
}

#[test(tokio::test(start_paused = true))]
async fn gives_up_when_no_endpoint_is_reachable() {
    let hub = MockHub::new();
    hub.set_unreachable(A, true);
    hub.set_unreachable(B, true);
    let connection = connection(&hub, &[A, B]);
    let eviction = connection.eviction_signal().unwrap();

    connection.connect();
    let result = connection.wait_connected(WAIT).await;

    assert!(matches!(result, Err(ConnectionError::Closed(_))));
    assert_eq!(connection.status(), ConnectionStatus::Closed);
    assert_eq!(connection.stats().failed_attempts, 6);
    tokio::time::timeout(WAIT, eviction).await.unwrap();
}

#[test(tokio::test(start_paused = true))]
async fn disconnect_and_resume() {
    let hub = MockHub::new();
    let connection = connection(&hub, &[A, B]);

    connection.connect();
    connection.wait_connected(WAIT).await.unwrap();
    connection.disconnect().await;

    assert_eq!(connection.status(), ConnectionStatus::Disconnected);
    assert!(connection.current_endpoint().is_none());
    assert!(matches!(connection.client(), Err(ConnectionError::NotConnected)));
    assert_eq!(hub.open_clients(), 0);

    // Disconnecting twice is harmless.
    connection.disconnect().await;

    connection.connect();
    assert_eq!(connection.wait_connected(WAIT).await.unwrap(), B);
}

#[test(tokio::test(start_paused = true))]
async fn requests_time_out() {
    let hub = MockHub::new();
    let connection = connection(&hub, &[A]);
    connection.connect();
    connection.wait_connected(WAIT).await.unwrap();

    hub.set_query_delay(Some(Duration::from_secs(20)));
    let result = connection
        .request(|client| async move { client.query_tracks().await })
        .await;
    assert_eq!(result, Err(ConnectionError::Timeout(Duration::from_secs(15))));

    hub.set_query_delay(None);
    let tracks = connection
        .request(|client| async move { client.query_tracks().await })
        .await
        .unwrap();
    assert!(tracks.is_empty());
}

#[test(tokio::test(start_paused = true))]
async fn teardown_closes_for_good() {
    let hub = MockHub::new();
    let connection = connection(&hub, &[A]);
    connection.connect();
    connection.wait_connected(WAIT).await.unwrap();

    connection.teardown().unwrap().await;
    assert_eq!(connection.status(), ConnectionStatus::Closed);

    connection.connect();
    assert_eq!(connection.status(), ConnectionStatus::Closed);
    assert_eq!(hub.connects(A), 1);
}
