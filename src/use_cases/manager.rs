// Match lifecycle owner: room registry, slot assignment, engine spawning,
// grace-period disposal, and the end-of-match lifecycle consumer.

use crate::domain::pong::Side;
use crate::frameworks::config;
use crate::use_cases::director;
use crate::use_cases::engine::{EngineInput, EngineRun, MatchEnd, PlayerEndpoint, match_task};
use crate::use_cases::hub::{ConnState, Hub};
use crate::interface_adapters::protocol::ServerMessage;
use crate::interface_adapters::state::AppState;
use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tracing::{debug, info, warn};

/// Occupant of one player slot.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub conn: u64,
    pub nickname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchPhase {
    Created,
    Running,
    Ended,
}

#[derive(Debug)]
struct MatchEntry {
    rounds: u32,
    left: Option<PlayerSlot>,
    right: Option<PlayerSlot>,
    phase: MatchPhase,
    /// Set when the room belongs to a tournament bracket node.
    tournament: Option<String>,
    input_tx: Option<mpsc::Sender<EngineInput>>,
    /// Latest serialized snapshot, for best-effort resends.
    state_tx: watch::Sender<Utf8Bytes>,
    shutdown: Arc<Notify>,
    dispose_scheduled: bool,
}

impl MatchEntry {
    fn side_of(&self, conn: u64) -> Option<Side> {
        if self.left.as_ref().is_some_and(|s| s.conn == conn) {
            Some(Side::Left)
        } else if self.right.as_ref().is_some_and(|s| s.conn == conn) {
            Some(Side::Right)
        } else {
            None
        }
    }
}

/// What a detach removed, for peer notification by the caller.
#[derive(Debug)]
pub struct DetachOutcome {
    pub room: String,
    pub was_running: bool,
    pub opponent: Option<PlayerSlot>,
    pub tournament: Option<String>,
    pub room_empty: bool,
}

#[derive(Debug, Default)]
struct ManagerInner {
    games: HashMap<String, MatchEntry>,
    player_rooms: HashMap<u64, String>,
}

/// Registry and lifecycle owner for all match rooms.
pub struct GameManager {
    hub: Arc<Hub>,
    end_tx: mpsc::Sender<MatchEnd>,
    inner: Mutex<ManagerInner>,
}

impl GameManager {
    pub fn new(hub: Arc<Hub>, end_tx: mpsc::Sender<MatchEnd>) -> Self {
        Self {
            hub,
            end_tx,
            inner: Mutex::new(ManagerInner::default()),
        }
    }

    /// Create a room; an existing room with the same id is left untouched.
    pub async fn create(&self, room: &str, rounds: u32, tournament: Option<String>) {
        let mut inner = self.inner.lock().await;
        if inner.games.contains_key(room) {
            debug!(room, "room already exists");
            return;
        }
        let (state_tx, _state_rx) = watch::channel(Utf8Bytes::from(""));
        inner.games.insert(
            room.to_string(),
            MatchEntry {
                rounds,
                left: None,
                right: None,
                phase: MatchPhase::Created,
                tournament,
                input_tx: None,
                state_tx,
                shutdown: Arc::new(Notify::new()),
                dispose_scheduled: false,
            },
        );
        info!(room, rounds, "room created");
    }

    /// Place a connection on the requested side, or the first free one.
    pub async fn attach(&self, room: &str, slot: PlayerSlot, side: Option<Side>) -> Option<Side> {
        let mut inner = self.inner.lock().await;
        let entry = inner.games.get_mut(room)?;

        let assigned = match side {
            Some(Side::Left) if entry.left.is_none() => {
                entry.left = Some(slot.clone());
                Some(Side::Left)
            }
            Some(Side::Right) if entry.right.is_none() => {
                entry.right = Some(slot.clone());
                Some(Side::Right)
            }
            None if entry.left.is_none() => {
                entry.left = Some(slot.clone());
                Some(Side::Left)
            }
            None if entry.right.is_none() => {
                entry.right = Some(slot.clone());
                Some(Side::Right)
            }
            _ => None,
        };

        if assigned.is_some() {
            inner.player_rooms.insert(slot.conn, room.to_string());
        }
        assigned
    }

    pub async fn room_of(&self, conn: u64) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.player_rooms.get(&conn).cloned()
    }

    pub async fn tournament_of_room(&self, room: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.games.get(room).and_then(|e| e.tournament.clone())
    }

    /// True while the connection occupies a slot of a running match.
    pub async fn in_running_match(&self, conn: u64) -> bool {
        let inner = self.inner.lock().await;
        let Some(room) = inner.player_rooms.get(&conn) else {
            return false;
        };
        inner
            .games
            .get(room)
            .is_some_and(|e| e.phase == MatchPhase::Running && e.side_of(conn).is_some())
    }

    /// Forward a paddle target to the owner's engine; unknown senders and
    /// senders without a slot are ignored.
    pub async fn set_paddle(&self, conn: u64, y: f64) {
        let inner = self.inner.lock().await;
        let Some(room) = inner.player_rooms.get(&conn) else {
            return;
        };
        let Some(entry) = inner.games.get(room) else {
            return;
        };
        let Some(side) = entry.side_of(conn) else {
            return;
        };
        if let Some(input_tx) = &entry.input_tx {
            // Engine inputs arrive at arbitrary rates; a full channel just
            // loses an intermediate paddle target.
            let _ = input_tx.try_send(EngineInput::Paddle { side, y });
        }
    }

    /// Launch the engine for a room whose both slots are occupied.
    pub async fn start(&self, room: &str) -> bool {
        let (left, right) = {
            let inner = self.inner.lock().await;
            let Some(entry) = inner.games.get(room) else {
                return false;
            };
            if entry.phase != MatchPhase::Created {
                warn!(room, "start requested for a non-pending room");
                return false;
            }
            match (&entry.left, &entry.right) {
                (Some(left), Some(right)) => (left.clone(), right.clone()),
                _ => {
                    warn!(room, "start requested with an empty slot");
                    return false;
                }
            }
        };

        // Hub lookups happen outside the registry lock (connections lock
        // orders before the match registry).
        let Some(left_handle) = self.hub.handle(left.conn).await else {
            return false;
        };
        let Some(right_handle) = self.hub.handle(right.conn).await else {
            return false;
        };

        let (input_tx, input_rx) = mpsc::channel(config::ENGINE_INPUT_CAPACITY);
        let run = {
            let mut inner = self.inner.lock().await;
            let Some(entry) = inner.games.get_mut(room) else {
                return false;
            };
            if entry.phase != MatchPhase::Created {
                return false;
            }
            entry.phase = MatchPhase::Running;
            entry.input_tx = Some(input_tx);
            EngineRun {
                room: room.to_string(),
                rounds: entry.rounds,
                left: PlayerEndpoint {
                    conn: left.conn,
                    nickname: left.nickname.clone(),
                    handle: left_handle,
                },
                right: PlayerEndpoint {
                    conn: right.conn,
                    nickname: right.nickname.clone(),
                    handle: right_handle,
                },
                input_rx,
                state_tx: entry.state_tx.clone(),
                shutdown: entry.shutdown.clone(),
                end_tx: self.end_tx.clone(),
            }
        };

        tokio::spawn(match_task(run));
        true
    }

    /// Remove a connection from its room.
    ///
    /// A running match loses its engine immediately (no result is produced);
    /// the opponent, if any, stays attached and is reported back so the
    /// caller can notify and detach them.
    pub async fn detach(&self, conn: u64) -> Option<DetachOutcome> {
        let mut inner = self.inner.lock().await;
        let room = inner.player_rooms.remove(&conn)?;
        let entry = inner.games.get_mut(&room)?;

        match entry.side_of(conn) {
            Some(Side::Left) => entry.left = None,
            Some(Side::Right) => entry.right = None,
            None => {}
        }

        let was_running = entry.phase == MatchPhase::Running;
        if was_running {
            if let Some(input_tx) = &entry.input_tx {
                let _ = input_tx.try_send(EngineInput::Abort);
            }
            entry.phase = MatchPhase::Ended;
        }

        let opponent = entry.left.clone().or_else(|| entry.right.clone());
        let room_empty = entry.left.is_none() && entry.right.is_none();
        let tournament = entry.tournament.clone();
        info!(conn_id = conn, room = %room, was_running, "player detached");

        Some(DetachOutcome {
            room,
            was_running,
            opponent,
            tournament,
            room_empty,
        })
    }

    /// Mark a room ended after the engine reported its result.
    pub async fn finish(&self, room: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.games.get_mut(room) {
            entry.phase = MatchPhase::Ended;
        }
    }

    /// Latest serialized snapshot of the sender's room, if one was emitted.
    pub async fn latest_snapshot(&self, conn: u64) -> Option<Utf8Bytes> {
        let inner = self.inner.lock().await;
        let room = inner.player_rooms.get(&conn)?;
        let entry = inner.games.get(room)?;
        let bytes = entry.state_tx.borrow().clone();
        if bytes.is_empty() { None } else { Some(bytes) }
    }

    /// Drop the room and any player mappings still pointing at it.
    pub async fn dispose(&self, room: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.games.remove(room) {
            entry.shutdown.notify_waiters();
            inner.player_rooms.retain(|_, r| r != room);
            info!(room, "room disposed");
        }
    }

    /// True once disposal has been scheduled for the room (and marks it so).
    async fn mark_dispose_scheduled(&self, room: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.games.get_mut(room) {
            Some(entry) => {
                let already = entry.dispose_scheduled;
                entry.dispose_scheduled = true;
                already
            }
            None => true,
        }
    }

    pub async fn active_game_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.games.len()
    }
}

/// Dispose a room after the grace period, so a late snapshot request can
/// still be served meanwhile.
pub async fn schedule_dispose(manager: Arc<GameManager>, room: String) {
    if manager.mark_dispose_scheduled(&room).await {
        return;
    }
    tokio::spawn(async move {
        tokio::time::sleep(config::GAME_DISPOSE_GRACE).await;
        manager.dispose(&room).await;
    });
}

/// Pull a connection out of its room, notifying and releasing the opponent
/// of a still-running match. Used by the disconnect cascade and by explicit
/// tournament withdrawal.
pub async fn teardown_match_for(app: &AppState, conn: u64) {
    let Some(outcome) = app.manager.detach(conn).await else {
        return;
    };

    if outcome.was_running {
        if let Some(opponent) = outcome.opponent {
            app.hub
                .send(
                    opponent.conn,
                    ServerMessage::OpponentLeft {
                        message: "Your opponent has disconnected.".to_string(),
                    },
                )
                .await;
            app.manager.detach(opponent.conn).await;
            let state = if app.director.is_member(opponent.conn).await {
                ConnState::InTournamentLobby
            } else {
                ConnState::Idle
            };
            app.hub.set_state(opponent.conn, state).await;
        }
    }

    schedule_dispose(app.manager.clone(), outcome.room).await;
}

/// Consume engine results: metrics, stats sink, state resets, disposal and
/// tournament advancement.
pub async fn run_match_lifecycle(mut end_rx: mpsc::Receiver<MatchEnd>, app: AppState) {
    while let Some(end) = end_rx.recv().await {
        app.metrics.games_completed.record();
        app.metrics.game_duration.observe(end.duration.as_secs_f64());

        let tournament = app.manager.tournament_of_room(&end.room).await;
        app.manager.finish(&end.room).await;
        schedule_dispose(app.manager.clone(), end.room.clone()).await;

        for (nickname, won) in [
            (end.winner_nickname.clone(), true),
            (end.loser_nickname.clone(), false),
        ] {
            let stats = app.stats.clone();
            let rounds = end.rounds;
            tokio::spawn(async move {
                if let Err(e) = stats.record_result(&nickname, won, rounds).await {
                    warn!(nickname = %nickname, error = ?e, "failed to record match stats");
                }
            });
        }

        for conn in [end.winner_conn, end.loser_conn] {
            let state = if app.director.is_member(conn).await {
                ConnState::InTournamentLobby
            } else {
                ConnState::Idle
            };
            app.hub.set_state(conn, state).await;
        }

        if let Some(tournament_id) = tournament {
            director::handle_match_end(&app, &tournament_id, end.winner_conn).await;
        }
    }
}
