//! A scripted two-device match, both devices in one process over the
//! in-memory medium.
//!
//! Run with `cargo run -p loopback-match` — set `RUST_LOG=debug` to see
//! every message and state transition.

use std::error::Error;
use std::time::Duration;

use poplink::prelude::*;
use poplink::{BUBBLE_COUNT, ROW_SIZES};
use tokio::time::timeout;
use tracing::info;

const SERVICE: &str = "com.poplink.demo";
const BUBBLE_COUNT_U8: u8 = BUBBLE_COUNT as u8;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let medium = MemoryMedium::new();

    let alice = CoopNode::host(
        medium.endpoint(),
        CoopNodeConfig::new(SERVICE, "Alice").color(PlayerColor::Rose),
    )
    .await?;
    let bob = CoopNode::join(
        medium.endpoint(),
        CoopNodeConfig::new(SERVICE, "Bob").color(PlayerColor::Mint),
    )
    .await?;

    // Bob finds Alice and requests a connection.
    let mut endpoints = bob.link().watch_endpoints();
    let found = timeout(
        Duration::from_secs(2),
        endpoints.wait_for(|e| !e.is_empty()),
    )
    .await??
    .clone();
    info!(host = %found[0].remote_name, "discovered");
    bob.connect_to(&found[0].endpoint).await?;

    // Both screens show the same token; both users tap accept.
    for node in [&alice, &bob] {
        let mut conn = node.link().watch_connection();
        let pending = timeout(
            Duration::from_secs(2),
            conn.wait_for(|c| c.is_some()),
        )
        .await??
        .clone();
        if let Some(pending) = pending {
            info!(token = %pending.auth_token, "verify and accept");
        }
    }
    alice.accept().await?;
    bob.accept().await?;

    for node in [&alice, &bob] {
        let mut game = node.sync().watch_game();
        timeout(
            Duration::from_secs(2),
            game.wait_for(|g| g.phase == CoopGamePhase::Setup),
        )
        .await??;
    }

    // Setup screen: a little chat, then ready up.
    alice.sync().send_chat("ready when you are").await?;
    bob.sync().send_chat("let's go").await?;
    alice.sync().set_ready(true).await?;
    bob.sync().set_ready(true).await?;
    {
        let mut game = alice.sync().watch_game();
        timeout(
            Duration::from_secs(2),
            game.wait_for(|g| {
                g.local.ready && g.opponent.as_ref().is_some_and(|o| o.ready)
            }),
        )
        .await??;
    }

    // A three-second match.
    alice.sync().start_game(3_000).await?;
    for node in [&alice, &bob] {
        let mut game = node.sync().watch_game();
        timeout(
            Duration::from_secs(2),
            game.wait_for(|g| g.phase == CoopGamePhase::Playing),
        )
        .await??;
    }
    info!("match started");

    // Both players tap away until the timer runs out: Alice sweeps from
    // the top of the board, Bob from the bottom, meeting in the middle.
    let alice_sync = alice.sync().clone();
    let alice_taps = tokio::spawn(async move {
        for id in 0..BUBBLE_COUNT_U8 {
            if alice_sync.claim_bubble(id).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(90)).await;
        }
    });
    let bob_sync = bob.sync().clone();
    let bob_taps = tokio::spawn(async move {
        for id in (0..BUBBLE_COUNT_U8).rev() {
            if bob_sync.claim_bubble(id).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(110)).await;
        }
    });

    for node in [&alice, &bob] {
        let mut game = node.sync().watch_game();
        timeout(
            Duration::from_secs(10),
            game.wait_for(|g| g.phase == CoopGamePhase::Finished),
        )
        .await??;
    }
    let _ = alice_taps.await;
    let _ = bob_taps.await;

    // Let the last in-flight claims settle before comparing.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let alice_game = alice.game();
    let bob_game = bob.game();
    println!();
    println!("final board (A = Alice, B = Bob, . = unclaimed):");
    print_board(&alice_game);
    println!(
        "Alice {} — Bob {}   (Bob's view: Bob {} — Alice {})",
        alice_game.local_score,
        alice_game.opponent_score,
        bob_game.local_score,
        bob_game.opponent_score,
    );

    bob.leave().await;
    alice.leave().await;
    Ok(())
}

/// Prints the board from Alice's perspective, widest row in the middle.
fn print_board(game: &CoopGameState) {
    let widest = ROW_SIZES.iter().copied().max().unwrap_or(0);
    let mut bubbles = game.bubbles.iter();
    for &size in &ROW_SIZES {
        let pad = " ".repeat(widest - size);
        let row: Vec<&str> = bubbles
            .by_ref()
            .take(size)
            .map(|b| match b.owner {
                Some(PlayerSide::Local) => "A",
                Some(PlayerSide::Opponent) => "B",
                None => ".",
            })
            .collect();
        println!("  {pad}{}", row.join(" "));
    }
}
