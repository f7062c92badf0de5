//! Sync coordinator actor: one Tokio task that owns the match state.
//!
//! Local intents arrive as commands, peer traffic arrives as decoded
//! messages, timers fire for the heartbeat and the match deadline — all
//! through one `select!` loop, so reducer events are applied strictly
//! one at a time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use poplink_game::{
    apply, CoopGamePhase, CoopGameState, GameEvent, PlayerSide,
};
use poplink_protocol::{
    parse_local_name, Codec, CoopMessage, JsonCodec, PlayerColor,
};
use poplink_session::{ConnectionState, LinkHandle};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{SyncConfig, SyncError};

/// Notifications the coordinator pushes out alongside state snapshots.
///
/// Chat has no home in [`CoopGameState`], and phase changes are easier
/// to react to as events than by diffing snapshots, so both go out on a
/// broadcast channel.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Chat {
        side: PlayerSide,
        content: String,
        timestamp: u64,
    },
    MatchStarted {
        duration_ms: u64,
    },
    MatchPaused,
    MatchResumed,
    MatchFinished,
    PeerLeft,
    /// A send the coordinator originated on its own (heartbeat, the
    /// match-end announcement, the pause ping) failed. Caller-initiated
    /// sends report failures on their `Result` replies instead.
    SendFailed {
        detail: String,
    },
}

enum SyncCommand {
    SetColor {
        color: PlayerColor,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    SetReady {
        ready: bool,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    SendChat {
        content: String,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    ClaimBubble {
        bubble_id: u8,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    StartGame {
        duration_ms: u64,
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    Pause {
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    Resume {
        reply: oneshot::Sender<Result<(), SyncError>>,
    },
    Shutdown,
}

/// Handle to a running sync coordinator. Cheap to clone.
#[derive(Clone)]
pub struct SyncHandle {
    sender: mpsc::Sender<SyncCommand>,
    game_rx: watch::Receiver<CoopGameState>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncHandle {
    /// A snapshot of the current match state.
    pub fn game(&self) -> CoopGameState {
        self.game_rx.borrow().clone()
    }

    /// Watches match state snapshots (one per applied event).
    pub fn watch_game(&self) -> watch::Receiver<CoopGameState> {
        self.game_rx.clone()
    }

    /// Subscribes to chat and phase notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Picks this player's claim color (setup screen only).
    pub async fn set_color(&self, color: PlayerColor) -> Result<(), SyncError> {
        self.request(|reply| SyncCommand::SetColor { color, reply }).await
    }

    /// Toggles this player's ready flag (setup screen only).
    pub async fn set_ready(&self, ready: bool) -> Result<(), SyncError> {
        self.request(|reply| SyncCommand::SetReady { ready, reply }).await
    }

    /// Sends a chat line to the peer.
    pub async fn send_chat(
        &self,
        content: impl Into<String>,
    ) -> Result<(), SyncError> {
        let content = content.into();
        self.request(|reply| SyncCommand::SendChat { content, reply }).await
    }

    /// Claims a bubble for this player.
    ///
    /// Applied optimistically on this device before the claim reaches
    /// the peer; the reducer's staleness guard reconciles races.
    ///
    /// # Errors
    /// [`SyncError::NotPlaying`] outside the `Playing` phase — the match
    /// state is untouched.
    pub async fn claim_bubble(&self, bubble_id: u8) -> Result<(), SyncError> {
        self.request(|reply| SyncCommand::ClaimBubble { bubble_id, reply })
            .await
    }

    /// Starts the match. Host only, and both players must be ready.
    pub async fn start_game(&self, duration_ms: u64) -> Result<(), SyncError> {
        self.request(|reply| SyncCommand::StartGame { duration_ms, reply })
            .await
    }

    /// Freezes the countdown (local only — the peer keeps playing).
    pub async fn pause(&self) -> Result<(), SyncError> {
        self.request(|reply| SyncCommand::Pause { reply }).await
    }

    /// Resumes a paused countdown with the frozen remaining time.
    pub async fn resume(&self) -> Result<(), SyncError> {
        self.request(|reply| SyncCommand::Resume { reply }).await
    }

    /// Stops the coordinator task.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(SyncCommand::Shutdown).await;
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), SyncError>>) -> SyncCommand,
    ) -> Result<(), SyncError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| SyncError::SyncClosed)?;
        reply_rx.await.map_err(|_| SyncError::SyncClosed)?
    }
}

struct SyncActor {
    link: LinkHandle,
    codec: JsonCodec,
    state: CoopGameState,
    game_tx: watch::Sender<CoopGameState>,
    events: broadcast::Sender<SyncEvent>,
    commands: mpsc::Receiver<SyncCommand>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    link_state: watch::Receiver<ConnectionState>,
    /// When the local countdown hits zero (only while `Playing`).
    deadline: Option<Instant>,
    /// Remaining countdown frozen by a pause.
    paused_remaining: Option<Duration>,
    config: SyncConfig,
}

impl SyncActor {
    async fn run(mut self) {
        info!(is_host = self.state.is_host, "sync coordinator started");

        let mut heartbeat =
            tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The peer may already be connected by the time we spawn; the
        // watch only reports *changes*, so look once up front.
        let initial = *self.link_state.borrow_and_update();
        if initial == ConnectionState::Connected {
            self.handle_link_state(initial);
        }

        loop {
            let deadline = self.deadline;
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(SyncCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                bytes = self.inbound.recv() => {
                    match bytes {
                        Some(bytes) => self.handle_inbound(&bytes),
                        // Link actor is gone; nothing more will arrive.
                        None => {
                            self.handle_peer_lost();
                            break;
                        }
                    }
                }
                changed = self.link_state.changed() => {
                    if changed.is_err() {
                        self.handle_peer_lost();
                        break;
                    }
                    let link_state = *self.link_state.borrow_and_update();
                    self.handle_link_state(link_state);
                }
                _ = heartbeat.tick() => {
                    self.send_heartbeat().await;
                }
                () = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.handle_deadline().await;
                }
            }
        }

        info!("sync coordinator stopped");
    }

    // -----------------------------------------------------------------
    // Local intents
    // -----------------------------------------------------------------

    async fn handle_command(&mut self, cmd: SyncCommand) {
        match cmd {
            SyncCommand::SetColor { color, reply } => {
                let _ = reply.send(self.handle_set_color(color).await);
            }
            SyncCommand::SetReady { ready, reply } => {
                let _ = reply.send(self.handle_set_ready(ready).await);
            }
            SyncCommand::SendChat { content, reply } => {
                let _ = reply.send(self.handle_send_chat(content).await);
            }
            SyncCommand::ClaimBubble { bubble_id, reply } => {
                let _ = reply.send(self.handle_claim(bubble_id).await);
            }
            SyncCommand::StartGame { duration_ms, reply } => {
                let _ = reply.send(self.handle_start_game(duration_ms).await);
            }
            SyncCommand::Pause { reply } => {
                let _ = reply.send(self.handle_pause().await);
            }
            SyncCommand::Resume { reply } => {
                let _ = reply.send(self.handle_resume().await);
            }
            // Handled in `run`.
            SyncCommand::Shutdown => {}
        }
    }

    async fn handle_set_color(
        &mut self,
        color: PlayerColor,
    ) -> Result<(), SyncError> {
        if self.state.phase != CoopGamePhase::Setup {
            return Err(SyncError::NotInSetup(self.state.phase));
        }
        // The host picks any color; the joiner may not mirror the
        // host's.
        if !self.state.is_host
            && self
                .state
                .opponent
                .as_ref()
                .is_some_and(|host| host.color == color)
        {
            return Err(SyncError::ColorTaken(color));
        }
        self.apply_event(GameEvent::ColorSelected {
            side: PlayerSide::Local,
            color,
        });
        self.send_message(&CoopMessage::ColorSelection {
            player_color: color,
            timestamp: now_ms(),
        })
        .await
    }

    async fn handle_set_ready(
        &mut self,
        ready: bool,
    ) -> Result<(), SyncError> {
        if self.state.phase != CoopGamePhase::Setup {
            return Err(SyncError::NotInSetup(self.state.phase));
        }
        self.apply_event(GameEvent::ReadyChanged {
            side: PlayerSide::Local,
            ready,
        });
        self.send_message(&CoopMessage::ReadyState {
            ready,
            timestamp: now_ms(),
        })
        .await
    }

    async fn handle_send_chat(
        &mut self,
        content: String,
    ) -> Result<(), SyncError> {
        let timestamp = now_ms();
        self.send_message(&CoopMessage::Chat {
            content: content.clone(),
            timestamp,
        })
        .await?;
        let _ = self.events.send(SyncEvent::Chat {
            side: PlayerSide::Local,
            content,
            timestamp,
        });
        Ok(())
    }

    async fn handle_claim(&mut self, bubble_id: u8) -> Result<(), SyncError> {
        if !self.state.phase.accepts_claims() {
            return Err(SyncError::NotPlaying(self.state.phase));
        }
        // Re-tapping your own bubble: nothing to apply, nothing to send.
        if self
            .state
            .bubbles
            .get(bubble_id as usize)
            .is_some_and(|b| b.owner == Some(PlayerSide::Local))
        {
            return Ok(());
        }
        let timestamp = now_ms();
        // Optimistic: this screen pops immediately. If the send below
        // fails the claim stands locally and the caller learns about the
        // delivery problem.
        self.apply_event(GameEvent::Claim {
            side: PlayerSide::Local,
            bubble_id,
            timestamp,
        });
        self.send_message(&CoopMessage::BubbleClaim {
            bubble_id,
            player_color: self.state.local.color,
            timestamp,
        })
        .await
    }

    async fn handle_start_game(
        &mut self,
        duration_ms: u64,
    ) -> Result<(), SyncError> {
        if !self.state.is_host {
            return Err(SyncError::NotHost);
        }
        if self.state.phase != CoopGamePhase::Setup {
            return Err(SyncError::NotInSetup(self.state.phase));
        }
        let both_ready = self.state.local.ready
            && self.state.opponent.as_ref().is_some_and(|o| o.ready);
        if !both_ready {
            return Err(SyncError::NotReady);
        }

        let timestamp = now_ms();
        self.apply_event(GameEvent::Started {
            duration_ms,
            now_ms: timestamp,
        });
        self.arm_deadline(Duration::from_millis(duration_ms));
        let _ = self.events.send(SyncEvent::MatchStarted { duration_ms });
        self.send_message(&CoopMessage::GameStart {
            duration_ms,
            timestamp,
        })
        .await
    }

    async fn handle_pause(&mut self) -> Result<(), SyncError> {
        if self.state.phase != CoopGamePhase::Playing {
            return Err(SyncError::InvalidPhase(self.state.phase));
        }
        self.paused_remaining = self
            .deadline
            .take()
            .map(|at| at.saturating_duration_since(Instant::now()));
        self.apply_event(GameEvent::Paused);
        let _ = self.events.send(SyncEvent::MatchPaused);
        // Ping the peer so the channel stays visibly alive while this
        // side is frozen.
        self.send_score_update().await;
        Ok(())
    }

    async fn handle_resume(&mut self) -> Result<(), SyncError> {
        if self.state.phase != CoopGamePhase::Paused {
            return Err(SyncError::InvalidPhase(self.state.phase));
        }
        self.apply_event(GameEvent::Resumed);
        if let Some(remaining) = self.paused_remaining.take() {
            self.arm_deadline(remaining);
        }
        let _ = self.events.send(SyncEvent::MatchResumed);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Peer traffic
    // -----------------------------------------------------------------

    fn handle_inbound(&mut self, bytes: &[u8]) {
        let msg: CoopMessage = match self.codec.decode(bytes) {
            Ok(msg) => msg,
            // A peer's malformed message must never take this device
            // down. Log and move on.
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "undecodable message, dropping");
                return;
            }
        };

        match msg {
            CoopMessage::Chat { content, timestamp } => {
                let _ = self.events.send(SyncEvent::Chat {
                    side: PlayerSide::Opponent,
                    content,
                    timestamp,
                });
            }

            CoopMessage::BubbleClaim {
                bubble_id,
                timestamp,
                ..
            } => {
                // Attribution is positional: the only other sender on
                // this link is the opponent. The color on the wire is
                // display metadata, not identity.
                self.apply_event(GameEvent::Claim {
                    side: PlayerSide::Opponent,
                    bubble_id,
                    timestamp,
                });
            }

            CoopMessage::GameStart { duration_ms, .. } => {
                if self.state.is_host {
                    // The host is the one authority on match start; a
                    // joiner announcing one is a protocol violation.
                    warn!("ignoring GAME_START from non-host peer");
                    return;
                }
                let was = self.state.phase;
                self.apply_event(GameEvent::Started {
                    duration_ms,
                    // Anchor the countdown to local receipt time; the
                    // sender's clock is not ours.
                    now_ms: now_ms(),
                });
                if was != self.state.phase {
                    self.arm_deadline(Duration::from_millis(duration_ms));
                    let _ =
                        self.events.send(SyncEvent::MatchStarted { duration_ms });
                }
            }

            CoopMessage::GameEnd {
                local_score,
                remote_score,
                ..
            } => {
                // Scores stay derived from our own board; the wire pair
                // is only checked for drift.
                self.check_scores(local_score, remote_score);
                self.finish_match();
            }

            CoopMessage::ScoreUpdate {
                local_score,
                remote_score,
                ..
            } => {
                self.check_scores(local_score, remote_score);
            }

            CoopMessage::ColorSelection { player_color, .. } => {
                self.apply_event(GameEvent::ColorSelected {
                    side: PlayerSide::Opponent,
                    color: player_color,
                });
            }

            CoopMessage::ReadyState { ready, .. } => {
                self.apply_event(GameEvent::ReadyChanged {
                    side: PlayerSide::Opponent,
                    ready,
                });
            }

            CoopMessage::Heartbeat { timestamp } => {
                debug!(timestamp, "heartbeat");
            }
        }
    }

    /// Compares the peer's reported scores (sent from *their*
    /// perspective) against our derived ones. A transient mismatch while
    /// claims are in flight is normal; it is only logged.
    fn check_scores(&self, their_local: u32, their_remote: u32) {
        if their_local != self.state.opponent_score
            || their_remote != self.state.local_score
        {
            debug!(
                their_local,
                their_remote,
                local = self.state.local_score,
                opponent = self.state.opponent_score,
                "peer scores differ from derived scores"
            );
        }
    }

    // -----------------------------------------------------------------
    // Link lifecycle and timers
    // -----------------------------------------------------------------

    fn handle_link_state(&mut self, link_state: ConnectionState) {
        match link_state {
            ConnectionState::Connected => {
                let Some(info) = self.link.watch_connection().borrow().clone()
                else {
                    return;
                };
                let (name, color) = match parse_local_name(&info.remote_name) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        // Show the raw name rather than refusing the
                        // peer over a cosmetic string.
                        warn!(error = %e, name = %info.remote_name, "unparseable peer name");
                        (info.remote_name.clone(), PlayerColor::default())
                    }
                };
                info!(%name, %color, "opponent joined");
                self.apply_event(GameEvent::OpponentJoined { name, color });
            }
            ConnectionState::Disconnected => {
                self.handle_peer_lost();
            }
            _ => {}
        }
    }

    fn handle_peer_lost(&mut self) {
        if self.state.phase.is_over() || self.state.opponent.is_none() {
            return;
        }
        info!("peer lost, forfeiting match");
        self.deadline = None;
        self.paused_remaining = None;
        self.apply_event(GameEvent::PeerDisconnected);
        let _ = self.events.send(SyncEvent::PeerLeft);
        let _ = self.events.send(SyncEvent::MatchFinished);
    }

    async fn handle_deadline(&mut self) {
        self.deadline = None;
        let local_score = self.state.local_score;
        let remote_score = self.state.opponent_score;
        self.finish_match();
        // Both deadlines fire within clock-skew of each other; the
        // message covers a peer that paused or drifted.
        self.send_background(&CoopMessage::GameEnd {
            local_score,
            remote_score,
            timestamp: now_ms(),
        })
        .await;
    }

    fn finish_match(&mut self) {
        if self.state.phase.is_over() {
            return;
        }
        let was = self.state.phase;
        self.apply_event(GameEvent::Finished);
        // The reducer refuses the transition outside an active match
        // (a rogue GAME_END during setup, say); nothing happened, so
        // nothing is announced.
        if self.state.phase == was {
            debug!(phase = %was, "ignoring finish outside an active match");
            return;
        }
        self.deadline = None;
        self.paused_remaining = None;
        let _ = self.events.send(SyncEvent::MatchFinished);
    }

    async fn send_heartbeat(&mut self) {
        if !self.link.state().is_connected() {
            return;
        }
        self.send_background(&CoopMessage::Heartbeat { timestamp: now_ms() })
            .await;
    }

    async fn send_score_update(&mut self) {
        self.send_background(&CoopMessage::ScoreUpdate {
            local_score: self.state.local_score,
            remote_score: self.state.opponent_score,
            timestamp: now_ms(),
        })
        .await;
    }

    /// Sends a message with no caller waiting on a reply. The failure
    /// has nowhere to return to, so it goes out on the event channel.
    async fn send_background(&mut self, msg: &CoopMessage) {
        if let Err(e) = self.send_message(msg).await {
            debug!(error = %e, "background send failed");
            let _ = self.events.send(SyncEvent::SendFailed {
                detail: e.to_string(),
            });
        }
    }

    // -----------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------

    fn apply_event(&mut self, event: GameEvent) {
        apply(&mut self.state, event);
        self.game_tx.send_replace(self.state.clone());
    }

    fn arm_deadline(&mut self, remaining: Duration) {
        self.deadline = Some(Instant::now() + remaining);
    }

    async fn send_message(
        &self,
        msg: &CoopMessage,
    ) -> Result<(), SyncError> {
        let bytes = self.codec.encode(msg)?;
        self.link.send(bytes).await?;
        Ok(())
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Only ever compared against other values produced the same way; a
/// pre-epoch clock degrades to timestamp 0 instead of failing.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Spawns a sync coordinator over an established (or establishing) link
/// and returns its handle.
///
/// Takes over the link's inbound payload stream; the caller keeps using
/// the [`LinkHandle`] for lifecycle operations.
pub fn spawn_sync(
    link: LinkHandle,
    state: CoopGameState,
    config: SyncConfig,
) -> SyncHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (game_tx, game_rx) = watch::channel(state.clone());
    let (events_tx, _) = broadcast::channel(64);

    // Same stand-in trick as the link actor: a taken inbound stream
    // leaves the coordinator command-only rather than dead on arrival.
    let (inbound, keepalive) = match link.take_inbound() {
        Some(rx) => (rx, None),
        None => {
            warn!("link inbound stream already taken");
            let (tx, rx) = mpsc::unbounded_channel();
            (rx, Some(tx))
        }
    };

    let actor = SyncActor {
        link_state: link.watch_state(),
        link,
        codec: JsonCodec,
        state,
        game_tx,
        events: events_tx.clone(),
        commands: cmd_rx,
        inbound,
        deadline: None,
        paused_remaining: None,
        config,
    };

    tokio::spawn(async move {
        let _keepalive = keepalive;
        actor.run().await;
    });

    SyncHandle {
        sender: cmd_tx,
        game_rx,
        events: events_tx,
    }
}
