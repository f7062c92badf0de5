//! End-to-end link lifecycle tests over the in-memory medium.

use std::time::Duration;

use poplink_session::{spawn_link, ConnectionState, LinkHandle, SessionError};
use poplink_transport::{MemoryMedium, MemoryTransport};
use tokio::time::timeout;

const SERVICE: &str = "com.poplink.coop";

async fn wait_for_state(handle: &LinkHandle, want: ConnectionState) {
    let mut rx = handle.watch_state();
    timeout(Duration::from_secs(1), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {want}"))
        .unwrap();
}

/// Spawns a host and a joiner on one medium, already advertising and
/// discovering respectively.
async fn host_and_joiner(
    medium: &MemoryMedium,
) -> (LinkHandle, MemoryTransport, LinkHandle, MemoryTransport) {
    let host_transport = medium.endpoint();
    let joiner_transport = medium.endpoint();
    let host = spawn_link(host_transport.clone(), "Alice:ROSE");
    let joiner = spawn_link(joiner_transport.clone(), "Bob:MINT");

    host.start_hosting(SERVICE).await.unwrap();
    joiner.start_discovery(SERVICE).await.unwrap();

    (host, host_transport, joiner, joiner_transport)
}

/// Drives the full handshake to `Connected` on both sides.
async fn connect(host: &LinkHandle, joiner: &LinkHandle) {
    let mut endpoints = joiner.watch_endpoints();
    let found = timeout(
        Duration::from_secs(1),
        endpoints.wait_for(|e| !e.is_empty()),
    )
    .await
    .expect("discovery timed out")
    .unwrap()
    .clone();

    joiner.request_connection(&found[0].endpoint).await.unwrap();

    for side in [host, joiner] {
        let mut conn = side.watch_connection();
        timeout(Duration::from_secs(1), conn.wait_for(|c| c.is_some()))
            .await
            .expect("handshake timed out")
            .unwrap();
    }
    host.accept_connection().await.unwrap();
    joiner.accept_connection().await.unwrap();

    wait_for_state(host, ConnectionState::Connected).await;
    wait_for_state(joiner, ConnectionState::Connected).await;
}

#[tokio::test]
async fn test_full_handshake_and_payload_exchange() {
    let medium = MemoryMedium::new();
    let (host, _, joiner, _) = host_and_joiner(&medium).await;

    // The joiner sees the host's advertised name before connecting.
    let mut endpoints = joiner.watch_endpoints();
    let found = timeout(
        Duration::from_secs(1),
        endpoints.wait_for(|e| !e.is_empty()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert_eq!(found[0].remote_name, "Alice:ROSE");

    connect(&host, &joiner).await;

    // Both sides saw the same auth token during the handshake.
    let host_conn = host.watch_connection().borrow().clone().unwrap();
    let joiner_conn = joiner.watch_connection().borrow().clone().unwrap();
    assert_eq!(host_conn.auth_token, joiner_conn.auth_token);
    assert!(host_conn.incoming);
    assert!(!joiner_conn.incoming);

    // Payloads flow both ways.
    let mut host_inbound = host.take_inbound().unwrap();
    let mut joiner_inbound = joiner.take_inbound().unwrap();

    host.send(b"hello from host".to_vec()).await.unwrap();
    let got = timeout(Duration::from_secs(1), joiner_inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, b"hello from host");

    joiner.send(b"hello from joiner".to_vec()).await.unwrap();
    let got = timeout(Duration::from_secs(1), host_inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, b"hello from joiner");
}

#[tokio::test]
async fn test_send_without_connection_fails_without_state_change() {
    let medium = MemoryMedium::new();
    let handle = spawn_link(medium.endpoint(), "Alice:ROSE");
    handle.start_hosting(SERVICE).await.unwrap();

    let err = handle.send(b"too early".to_vec()).await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
    assert_eq!(handle.state(), ConnectionState::Advertising);
}

#[tokio::test]
async fn test_reject_reverts_both_sides_to_search_states() {
    let medium = MemoryMedium::new();
    let (host, _, joiner, _) = host_and_joiner(&medium).await;

    let mut endpoints = joiner.watch_endpoints();
    let found = timeout(
        Duration::from_secs(1),
        endpoints.wait_for(|e| !e.is_empty()),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    joiner.request_connection(&found[0].endpoint).await.unwrap();

    let mut host_conn = host.watch_connection();
    timeout(Duration::from_secs(1), host_conn.wait_for(|c| c.is_some()))
        .await
        .unwrap()
        .unwrap();

    host.reject_connection().await.unwrap();

    wait_for_state(&host, ConnectionState::Advertising).await;
    wait_for_state(&joiner, ConnectionState::Discovering).await;
    assert!(host.watch_connection().borrow().is_none());
    assert!(joiner.watch_connection().borrow().is_none());
}

#[tokio::test]
async fn test_local_disconnect_propagates_to_peer() {
    let medium = MemoryMedium::new();
    let (host, _, joiner, _) = host_and_joiner(&medium).await;
    connect(&host, &joiner).await;

    host.disconnect().await;

    assert_eq!(host.state(), ConnectionState::Disconnected);
    wait_for_state(&joiner, ConnectionState::Disconnected).await;
    assert!(joiner.watch_connection().borrow().is_none());
}

#[tokio::test]
async fn test_severed_medium_lands_both_sides_in_disconnected() {
    let medium = MemoryMedium::new();
    let (host, host_t, joiner, joiner_t) = host_and_joiner(&medium).await;
    connect(&host, &joiner).await;

    medium.sever(host_t.endpoint_id(), joiner_t.endpoint_id());

    wait_for_state(&host, ConnectionState::Disconnected).await;
    wait_for_state(&joiner, ConnectionState::Disconnected).await;
}

#[tokio::test]
async fn test_start_hosting_recovers_from_already_advertising() {
    // The medium was started out-of-band, so its "already in progress"
    // complaint is cosmetic: the link still lands in Advertising.
    let medium = MemoryMedium::new();
    let transport = medium.endpoint();
    use poplink_transport::LinkTransport;
    transport.start_advertising(SERVICE, "Alice:ROSE").await.unwrap();

    let handle = spawn_link(transport, "Alice:ROSE");
    handle.start_hosting(SERVICE).await.unwrap();
    assert_eq!(handle.state(), ConnectionState::Advertising);
}

#[tokio::test]
async fn test_start_hosting_twice_is_idempotent() {
    let medium = MemoryMedium::new();
    let handle = spawn_link(medium.endpoint(), "Alice:ROSE");
    handle.start_hosting(SERVICE).await.unwrap();

    // Second call succeeds without disturbing the state (and without
    // re-poking the medium, which would complain).
    handle.start_hosting(SERVICE).await.unwrap();
    assert_eq!(handle.state(), ConnectionState::Advertising);
}

#[tokio::test]
async fn test_stop_operations_are_idempotent_from_any_state() {
    let medium = MemoryMedium::new();
    let handle = spawn_link(medium.endpoint(), "Alice:ROSE");

    // Nothing active: all no-ops.
    handle.stop_advertising().await;
    handle.stop_discovery().await;
    handle.disconnect().await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);

    // Active advertisement: stop lands back in Disconnected, twice.
    handle.start_hosting(SERVICE).await.unwrap();
    handle.stop_advertising().await;
    handle.stop_advertising().await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);

    // Same for discovery, and the endpoint list is cleared.
    handle.start_discovery(SERVICE).await.unwrap();
    handle.stop_discovery().await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert!(handle.watch_endpoints().borrow().is_empty());
}

#[tokio::test]
async fn test_third_endpoint_cannot_displace_active_connection() {
    let medium = MemoryMedium::new();
    let (host, host_t, joiner, _) = host_and_joiner(&medium).await;
    connect(&host, &joiner).await;
    let before = host.watch_connection().borrow().clone().unwrap();

    // A stranger fires a raw connection request at the connected host.
    use poplink_transport::LinkTransport;
    let eve = medium.endpoint();
    eve.request_connection(host_t.endpoint_id(), "Eve:SKY")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(host.state(), ConnectionState::Connected);
    let held = host.watch_connection().borrow().clone().unwrap();
    assert_eq!(held, before, "intruder displaced the held connection");

    // Payloads still route to the real peer.
    let mut joiner_inbound = joiner.take_inbound().unwrap();
    host.send(b"still you".to_vec()).await.unwrap();
    let got = timeout(Duration::from_secs(1), joiner_inbound.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got, b"still you");
}

#[tokio::test]
async fn test_request_connection_to_unknown_endpoint_fails() {
    let medium = MemoryMedium::new();
    let handle = spawn_link(medium.endpoint(), "Bob:MINT");
    handle.start_discovery(SERVICE).await.unwrap();

    let err = handle
        .request_connection(&poplink_transport::EndpointId::new("ZZZZ"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UnknownEndpoint(_)));
}

#[tokio::test]
async fn test_flaky_send_surfaces_error_but_stays_connected() {
    let medium = MemoryMedium::new();
    let (host, host_t, joiner, _) = host_and_joiner(&medium).await;
    connect(&host, &joiner).await;

    medium.set_flaky_send(host_t.endpoint_id(), true);
    let err = host.send(b"dropped".to_vec()).await.unwrap_err();
    assert!(matches!(err, SessionError::Transport(_)));
    assert_eq!(host.state(), ConnectionState::Connected);

    // Recovers once the medium behaves again.
    medium.set_flaky_send(host_t.endpoint_id(), false);
    host.send(b"delivered".to_vec()).await.unwrap();
}
