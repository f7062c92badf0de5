//! Two full stacks on one in-memory medium, exercising setup, claims,
//! convergence, timers, and disconnect handling.

use std::time::Duration;

use poplink_game::{CoopGamePhase, CoopGameState, PlayerSide};
use poplink_protocol::{Codec, CoopMessage, JsonCodec, PlayerColor};
use poplink_session::{spawn_link, LinkHandle};
use poplink_sync::{spawn_sync, SyncConfig, SyncError, SyncEvent, SyncHandle};
use poplink_transport::{MemoryMedium, MemoryTransport};
use tokio::time::timeout;

const SERVICE: &str = "com.poplink.coop";

/// Builds two connected links on one medium (host first), returning the
/// raw transports too so tests can poke the medium underneath.
async fn connected_links(
    medium: &MemoryMedium,
) -> (LinkHandle, MemoryTransport, LinkHandle, MemoryTransport) {
    let host_transport = medium.endpoint();
    let joiner_transport = medium.endpoint();
    let host = spawn_link(host_transport.clone(), "Alice:ROSE");
    let joiner = spawn_link(joiner_transport.clone(), "Bob:MINT");

    host.start_hosting(SERVICE).await.unwrap();
    joiner.start_discovery(SERVICE).await.unwrap();

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

    for side in [&host, &joiner] {
        let mut conn = side.watch_connection();
        timeout(Duration::from_secs(1), conn.wait_for(|c| c.is_some()))
            .await
            .expect("handshake timed out")
            .unwrap();
    }
    host.accept_connection().await.unwrap();
    joiner.accept_connection().await.unwrap();
    for side in [&host, &joiner] {
        let mut state = side.watch_state();
        timeout(
            Duration::from_secs(1),
            state.wait_for(|s| s.is_connected()),
        )
        .await
        .expect("connect timed out")
        .unwrap();
    }

    (host, host_transport, joiner, joiner_transport)
}

/// Two coordinators over a fresh pair of connected links.
async fn pair(medium: &MemoryMedium) -> (SyncHandle, SyncHandle, LinkHandle, LinkHandle) {
    let (host_link, _, joiner_link, _) = connected_links(medium).await;
    let host = spawn_sync(
        host_link.clone(),
        CoopGameState::new(true, "Alice", PlayerColor::Rose),
        SyncConfig::default(),
    );
    let joiner = spawn_sync(
        joiner_link.clone(),
        CoopGameState::new(false, "Bob", PlayerColor::Mint),
        SyncConfig::default(),
    );

    // Both coordinators observe the already-connected link and move to
    // the setup screen with the peer's profile filled in.
    for side in [&host, &joiner] {
        wait_for_game(side, |g| g.phase == CoopGamePhase::Setup).await;
    }

    (host, joiner, host_link, joiner_link)
}

async fn wait_for_game(
    handle: &SyncHandle,
    predicate: impl FnMut(&CoopGameState) -> bool,
) -> CoopGameState {
    let mut rx = handle.watch_game();
    timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("timed out waiting on game state")
        .unwrap()
        .clone()
}

/// Readies both sides and starts a match of `duration_ms`.
async fn to_playing(host: &SyncHandle, joiner: &SyncHandle, duration_ms: u64) {
    host.set_ready(true).await.unwrap();
    joiner.set_ready(true).await.unwrap();
    wait_for_game(host, |g| {
        g.local.ready && g.opponent.as_ref().is_some_and(|o| o.ready)
    })
    .await;

    host.start_game(duration_ms).await.unwrap();
    for side in [host, joiner] {
        wait_for_game(side, |g| g.phase == CoopGamePhase::Playing).await;
    }
}

#[tokio::test]
async fn test_setup_exchanges_profiles() {
    let medium = MemoryMedium::new();
    let (host, joiner, _, _) = pair(&medium).await;

    let host_game = host.game();
    assert_eq!(host_game.opponent.as_ref().unwrap().name, "Bob");
    assert_eq!(host_game.opponent.as_ref().unwrap().color, PlayerColor::Mint);

    let joiner_game = joiner.game();
    assert_eq!(joiner_game.opponent.as_ref().unwrap().name, "Alice");
    assert_eq!(
        joiner_game.opponent.as_ref().unwrap().color,
        PlayerColor::Rose
    );
}

#[tokio::test]
async fn test_color_and_ready_propagate() {
    let medium = MemoryMedium::new();
    let (host, joiner, _, _) = pair(&medium).await;

    host.set_color(PlayerColor::Amber).await.unwrap();
    host.set_ready(true).await.unwrap();

    let seen = wait_for_game(&joiner, |g| {
        g.opponent.as_ref().is_some_and(|o| o.ready)
    })
    .await;
    assert_eq!(seen.opponent.as_ref().unwrap().color, PlayerColor::Amber);
}

#[tokio::test]
async fn test_start_game_reaches_playing_on_both_sides() {
    let medium = MemoryMedium::new();
    let (host, joiner, _, _) = pair(&medium).await;

    to_playing(&host, &joiner, 60_000).await;

    assert_eq!(host.game().match_duration_ms, 60_000);
    assert_eq!(joiner.game().match_duration_ms, 60_000);
}

#[tokio::test]
async fn test_joiner_cannot_start_game() {
    let medium = MemoryMedium::new();
    let (host, joiner, _, _) = pair(&medium).await;
    host.set_ready(true).await.unwrap();
    joiner.set_ready(true).await.unwrap();

    let err = joiner.start_game(60_000).await.unwrap_err();
    assert!(matches!(err, SyncError::NotHost));
    assert_eq!(joiner.game().phase, CoopGamePhase::Setup);
}

#[tokio::test]
async fn test_start_game_requires_both_ready() {
    let medium = MemoryMedium::new();
    let (host, joiner, _, _) = pair(&medium).await;
    host.set_ready(true).await.unwrap();
    let _ = joiner; // stays not ready

    let err = host.start_game(60_000).await.unwrap_err();
    assert!(matches!(err, SyncError::NotReady));
}

#[tokio::test]
async fn test_host_ignores_game_start_from_peer() {
    // A joiner announcing GAME_START on the wire is a protocol
    // violation; the host must stay on the setup screen.
    let medium = MemoryMedium::new();
    let (host_link, _, joiner_link, _) = connected_links(&medium).await;
    let host = spawn_sync(
        host_link,
        CoopGameState::new(true, "Alice", PlayerColor::Rose),
        SyncConfig::default(),
    );
    wait_for_game(&host, |g| g.phase == CoopGamePhase::Setup).await;

    let rogue = JsonCodec
        .encode(&CoopMessage::GameStart {
            duration_ms: 60_000,
            timestamp: 1,
        })
        .unwrap();
    joiner_link.send(rogue).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(host.game().phase, CoopGamePhase::Setup);
}

#[tokio::test]
async fn test_claim_applies_locally_and_propagates() {
    let medium = MemoryMedium::new();
    let (host, joiner, _, _) = pair(&medium).await;
    to_playing(&host, &joiner, 60_000).await;

    host.claim_bubble(10).await.unwrap();

    // Optimistic on the claimant...
    let host_game = host.game();
    assert_eq!(host_game.bubbles[10].owner, Some(PlayerSide::Local));
    assert_eq!(host_game.local_score, 1);

    // ...and attributed to the opponent on the peer.
    let joiner_game =
        wait_for_game(&joiner, |g| g.bubbles[10].owner.is_some()).await;
    assert_eq!(joiner_game.bubbles[10].owner, Some(PlayerSide::Opponent));
    assert_eq!(joiner_game.opponent_score, 1);
    assert_eq!(joiner_game.local_score, 0);
}

#[tokio::test]
async fn test_joiner_cannot_take_the_hosts_color() {
    let medium = MemoryMedium::new();
    let (host, joiner, _, _) = pair(&medium).await;

    // The host already announced Rose during setup.
    let err = joiner.set_color(PlayerColor::Rose).await.unwrap_err();
    assert!(matches!(err, SyncError::ColorTaken(PlayerColor::Rose)));
    assert_eq!(joiner.game().local.color, PlayerColor::Mint);

    // The host is free to mirror the joiner, and to pick anything.
    host.set_color(PlayerColor::Mint).await.unwrap();
}

#[tokio::test]
async fn test_reclaiming_own_bubble_sends_nothing() {
    let medium = MemoryMedium::new();
    let (host_link, _, joiner_link, _) = connected_links(&medium).await;
    let host = spawn_sync(
        host_link,
        CoopGameState::new(true, "Alice", PlayerColor::Rose),
        SyncConfig::default(),
    );
    wait_for_game(&host, |g| g.phase == CoopGamePhase::Setup).await;

    // Script the joiner side on the raw link so the wire is observable.
    let mut inbound = joiner_link.take_inbound().unwrap();
    joiner_link
        .send(
            JsonCodec
                .encode(&CoopMessage::ReadyState {
                    ready: true,
                    timestamp: 1,
                })
                .unwrap(),
        )
        .await
        .unwrap();
    host.set_ready(true).await.unwrap();
    wait_for_game(&host, |g| {
        g.opponent.as_ref().is_some_and(|o| o.ready)
    })
    .await;
    host.start_game(60_000).await.unwrap();

    host.claim_bubble(7).await.unwrap();
    host.claim_bubble(7).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut claims = 0;
    while let Ok(bytes) = inbound.try_recv() {
        if matches!(
            JsonCodec.decode::<CoopMessage>(&bytes),
            Ok(CoopMessage::BubbleClaim { .. })
        ) {
            claims += 1;
        }
    }
    assert_eq!(claims, 1);
    assert_eq!(host.game().local_score, 1);
}

#[tokio::test]
async fn test_claim_outside_playing_is_an_error() {
    let medium = MemoryMedium::new();
    let (host, _joiner, _, _) = pair(&medium).await;

    let err = host.claim_bubble(10).await.unwrap_err();
    assert!(matches!(err, SyncError::NotPlaying(CoopGamePhase::Setup)));
    assert!(host.game().bubbles[10].owner.is_none());
}

#[tokio::test]
async fn test_later_claim_wins_on_both_devices() {
    let medium = MemoryMedium::new();
    let (host, joiner, _, _) = pair(&medium).await;
    to_playing(&host, &joiner, 60_000).await;

    host.claim_bubble(5).await.unwrap();
    wait_for_game(&joiner, |g| g.bubbles[5].owner.is_some()).await;

    // Strictly later wall-clock timestamp for the counter-claim.
    tokio::time::sleep(Duration::from_millis(5)).await;
    joiner.claim_bubble(5).await.unwrap();

    let host_game = wait_for_game(&host, |g| {
        g.bubbles[5].owner == Some(PlayerSide::Opponent)
    })
    .await;
    assert_eq!(host_game.local_score, 0);
    assert_eq!(host_game.opponent_score, 1);

    let joiner_game = joiner.game();
    assert_eq!(joiner_game.bubbles[5].owner, Some(PlayerSide::Local));
    assert_eq!(joiner_game.local_score, 1);
    assert_eq!(joiner_game.opponent_score, 0);
}

#[tokio::test]
async fn test_deadline_finishes_match_on_both_sides() {
    let medium = MemoryMedium::new();
    let (host, joiner, _, _) = pair(&medium).await;
    to_playing(&host, &joiner, 200).await;

    for side in [&host, &joiner] {
        wait_for_game(side, |g| g.phase == CoopGamePhase::Finished).await;
    }
}

#[tokio::test]
async fn test_pause_freezes_the_countdown() {
    // Pause is local-only, so a live peer would run its own countdown
    // down and legally end the paused match. Script the peer on a raw
    // link instead: no coordinator, no timer on that side.
    let medium = MemoryMedium::new();
    let (host_link, _, joiner_link, _) = connected_links(&medium).await;
    let host = spawn_sync(
        host_link,
        CoopGameState::new(true, "Alice", PlayerColor::Rose),
        SyncConfig::default(),
    );
    wait_for_game(&host, |g| g.phase == CoopGamePhase::Setup).await;

    joiner_link
        .send(
            JsonCodec
                .encode(&CoopMessage::ReadyState {
                    ready: true,
                    timestamp: 1,
                })
                .unwrap(),
        )
        .await
        .unwrap();
    host.set_ready(true).await.unwrap();
    wait_for_game(&host, |g| {
        g.opponent.as_ref().is_some_and(|o| o.ready)
    })
    .await;
    host.start_game(300).await.unwrap();

    host.pause().await.unwrap();
    assert_eq!(host.game().phase, CoopGamePhase::Paused);

    // Well past the original deadline, still frozen.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(host.game().phase, CoopGamePhase::Paused);

    host.resume().await.unwrap();
    wait_for_game(&host, |g| g.phase == CoopGamePhase::Finished).await;
}

#[tokio::test]
async fn test_game_end_during_setup_is_ignored() {
    // A rogue GAME_END before the match starts must neither change the
    // phase nor tell the UI the match finished.
    let medium = MemoryMedium::new();
    let (host_link, _, joiner_link, _) = connected_links(&medium).await;
    let host = spawn_sync(
        host_link,
        CoopGameState::new(true, "Alice", PlayerColor::Rose),
        SyncConfig::default(),
    );
    wait_for_game(&host, |g| g.phase == CoopGamePhase::Setup).await;
    let mut events = host.subscribe();

    joiner_link
        .send(
            JsonCodec
                .encode(&CoopMessage::GameEnd {
                    local_score: 44,
                    remote_score: 0,
                    timestamp: 1,
                })
                .unwrap(),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(host.game().phase, CoopGamePhase::Setup);
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, SyncEvent::MatchFinished),
            "spurious MatchFinished for a match that never started"
        );
    }
}

#[tokio::test]
async fn test_background_send_failure_reaches_event_channel() {
    let medium = MemoryMedium::new();
    let (host_link, host_transport, joiner_link, _) =
        connected_links(&medium).await;
    let host = spawn_sync(
        host_link,
        CoopGameState::new(true, "Alice", PlayerColor::Rose),
        SyncConfig::default(),
    );
    let joiner = spawn_sync(
        joiner_link,
        CoopGameState::new(false, "Bob", PlayerColor::Mint),
        SyncConfig::default(),
    );
    for side in [&host, &joiner] {
        wait_for_game(side, |g| g.phase == CoopGamePhase::Setup).await;
    }
    to_playing(&host, &joiner, 60_000).await;
    let mut events = host.subscribe();

    // The pause ping has no caller waiting on a reply; its failure must
    // surface on the event channel instead of vanishing into a log.
    medium.set_flaky_send(host_transport.endpoint_id(), true);
    host.pause().await.unwrap();

    let saw_failure = async {
        loop {
            if let Ok(SyncEvent::SendFailed { .. }) = events.recv().await {
                return;
            }
        }
    };
    timeout(Duration::from_secs(1), saw_failure)
        .await
        .expect("no SendFailed event");
}

#[tokio::test]
async fn test_peer_disconnect_forfeits_match() {
    let medium = MemoryMedium::new();
    let (host, joiner, _, joiner_link) = pair(&medium).await;
    to_playing(&host, &joiner, 60_000).await;
    let mut events = host.subscribe();

    joiner_link.disconnect().await;

    wait_for_game(&host, |g| g.phase == CoopGamePhase::Finished).await;
    let saw_peer_left = async {
        loop {
            if let Ok(SyncEvent::PeerLeft) = events.recv().await {
                return;
            }
        }
    };
    timeout(Duration::from_secs(1), saw_peer_left)
        .await
        .expect("no PeerLeft event");
}

#[tokio::test]
async fn test_chat_reaches_the_peer() {
    let medium = MemoryMedium::new();
    let (host, joiner, _, _) = pair(&medium).await;
    let mut events = joiner.subscribe();

    host.send_chat("good luck!").await.unwrap();

    let chat = timeout(Duration::from_secs(1), async {
        loop {
            if let Ok(SyncEvent::Chat { side, content, .. }) =
                events.recv().await
            {
                return (side, content);
            }
        }
    })
    .await
    .expect("no chat event");
    assert_eq!(chat, (PlayerSide::Opponent, "good luck!".to_string()));
}

#[tokio::test]
async fn test_malformed_message_is_dropped_without_harm() {
    let medium = MemoryMedium::new();
    let (host_link, _, joiner_link, _) = connected_links(&medium).await;
    let host = spawn_sync(
        host_link,
        CoopGameState::new(true, "Alice", PlayerColor::Rose),
        SyncConfig::default(),
    );
    wait_for_game(&host, |g| g.phase == CoopGamePhase::Setup).await;

    joiner_link.send(b"{not json at all".to_vec()).await.unwrap();
    joiner_link
        .send(br#"{"type":"NO_SUCH_TYPE","timestamp":1}"#.to_vec())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(host.game().phase, CoopGamePhase::Setup);
}
