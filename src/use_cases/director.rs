// Tournament director: registry of brackets plus the orchestration that
// launches matches, records results, and walks winners through the tree.

use crate::domain::bracket::{
    Entrant, JoinError, MatchOutcome, StartError, Tournament, VALID_SIZES,
};
use crate::frameworks::config;
use crate::interface_adapters::protocol::{ServerMessage, TournamentStateDto, TournamentSummaryDto};
use crate::interface_adapters::state::AppState;
use crate::use_cases::hub::ConnState;
use crate::use_cases::manager;
use crate::use_cases::manager::PlayerSlot;
use crate::domain::pong::Side;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_ROUNDS: u32 = 3;
pub const DEFAULT_SIZE: usize = 8;

#[derive(Debug, Default)]
struct DirectorInner {
    tournaments: HashMap<String, Tournament>,
    /// Reverse index: connection -> tournament id.
    members: HashMap<u64, String>,
}

/// Registry of all tournaments, pending and started.
#[derive(Debug, Default)]
pub struct TournamentDirector {
    inner: Mutex<DirectorInner>,
}

impl TournamentDirector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DirectorInner::default()),
        }
    }

    pub async fn is_member(&self, conn: u64) -> bool {
        self.inner.lock().await.members.contains_key(&conn)
    }

    pub async fn member_tournament(&self, conn: u64) -> Option<String> {
        self.inner.lock().await.members.get(&conn).cloned()
    }

    pub async fn state_dto(&self, id: &str) -> Option<TournamentStateDto> {
        let inner = self.inner.lock().await;
        inner.tournaments.get(id).map(TournamentStateDto::from)
    }

    async fn entrant_conns(&self, id: &str) -> Vec<u64> {
        let inner = self.inner.lock().await;
        inner
            .tournaments
            .get(id)
            .map(|t| t.players.iter().map(|p| p.conn).collect())
            .unwrap_or_default()
    }

    /// Lobby list: joinable tournaments plus started ones mid-match.
    pub async fn tournament_list_frame(&self) -> ServerMessage {
        let inner = self.inner.lock().await;
        ServerMessage::TournamentList {
            tournaments: inner
                .tournaments
                .values()
                .filter(|t| !t.started || t.active_node().is_some())
                .map(TournamentSummaryDto::from)
                .collect(),
        }
    }

    pub async fn tournament_count(&self) -> usize {
        self.inner.lock().await.tournaments.len()
    }
}

pub async fn broadcast_tournament_list(app: &AppState) {
    let frame = app.director.tournament_list_frame().await;
    app.hub.broadcast(&frame).await;
}

// One tournament_update to every current entrant.
async fn fan_update(app: &AppState, id: &str) {
    let (conns, dto) = {
        let inner = app.director.inner.lock().await;
        match inner.tournaments.get(id) {
            Some(t) => (
                t.players.iter().map(|p| p.conn).collect::<Vec<_>>(),
                TournamentStateDto::from(t),
            ),
            None => return,
        }
    };
    for conn in conns {
        app.hub
            .send(conn, ServerMessage::TournamentUpdate { tournament: dto.clone() })
            .await;
    }
}

async fn send_error(app: &AppState, conn: u64, message: &str) {
    app.hub
        .send(
            conn,
            ServerMessage::TournamentError {
                message: message.to_string(),
            },
        )
        .await;
}

pub async fn handle_create(
    app: &AppState,
    conn: u64,
    nickname: String,
    name: Option<String>,
    rounds: Option<u32>,
    size: Option<usize>,
) {
    let size = size.unwrap_or(DEFAULT_SIZE);
    if !VALID_SIZES.contains(&size) {
        send_error(app, conn, "Tournament size must be 4, 6, or 8 players").await;
        return;
    }

    let name = name.unwrap_or_else(|| format!("{nickname}'s Tournament"));
    let rounds = rounds.unwrap_or(DEFAULT_ROUNDS);
    app.hub.set_nickname(conn, &nickname).await;

    let id = Uuid::new_v4().to_string();
    {
        let mut inner = app.director.inner.lock().await;
        if inner.members.contains_key(&conn) {
            drop(inner);
            send_error(app, conn, "You are already in a tournament").await;
            return;
        }
        let creator = Entrant { conn, nickname };
        inner
            .tournaments
            .insert(id.clone(), Tournament::new(id.clone(), name, creator, size, rounds));
        inner.members.insert(conn, id.clone());
    }
    app.hub.set_state(conn, ConnState::InTournamentLobby).await;
    app.metrics.tournaments_created.record();
    info!(tournament_id = %id, conn_id = conn, size, rounds, "tournament created");

    if let Some(tournament) = app.director.state_dto(&id).await {
        app.hub
            .send(conn, ServerMessage::TournamentCreated { tournament })
            .await;
    }
    broadcast_tournament_list(app).await;
}

pub async fn handle_join(app: &AppState, conn: u64, tournament_id: String, nickname: String) {
    app.hub.set_nickname(conn, &nickname).await;

    let result: Result<(), &'static str> = {
        let mut inner = app.director.inner.lock().await;
        if inner
            .members
            .get(&conn)
            .is_some_and(|id| *id != tournament_id)
        {
            Err("You are already in a tournament")
        } else {
            match inner.tournaments.get_mut(&tournament_id) {
                None => Err("Tournament not found"),
                Some(t) => match t.add_player(Entrant {
                    conn,
                    nickname: nickname.clone(),
                }) {
                    Ok(()) => {
                        inner.members.insert(conn, tournament_id.clone());
                        Ok(())
                    }
                    Err(JoinError::AlreadyStarted) => {
                        Err("Cannot join: Tournament has already started")
                    }
                    Err(JoinError::NicknameTaken | JoinError::Full | JoinError::AlreadyEntered) => {
                        Err("Cannot join tournament. It might be full or nickname is already taken.")
                    }
                },
            }
        }
    };

    match result {
        Err(message) => send_error(app, conn, message).await,
        Ok(()) => {
            app.hub.set_state(conn, ConnState::InTournamentLobby).await;
            info!(tournament_id = %tournament_id, conn_id = conn, nickname = %nickname, "player joined tournament");
            if let Some(tournament) = app.director.state_dto(&tournament_id).await {
                app.hub
                    .send(conn, ServerMessage::TournamentJoined { tournament })
                    .await;
            }
            fan_update(app, &tournament_id).await;
            broadcast_tournament_list(app).await;
        }
    }
}

pub async fn handle_start(app: &AppState, conn: u64, tournament_id: String) {
    let result: Result<(), String> = {
        let mut inner = app.director.inner.lock().await;
        match inner.tournaments.get_mut(&tournament_id) {
            None => Err("Tournament not found".to_string()),
            Some(t) if t.creator != conn => {
                Err("Only the tournament creator can start the tournament".to_string())
            }
            Some(t) => {
                let mut order = t.players.clone();
                order.shuffle(&mut rand::rng());
                t.start(order).map_err(|e| {
                    let count = t.players.len();
                    match e {
                        StartError::WrongPlayerCount if count < 4 => {
                            "Cannot start: Need at least 4 players".to_string()
                        }
                        StartError::WrongPlayerCount if !VALID_SIZES.contains(&count) => {
                            "Cannot start: Tournament requires 4, 6, or 8 players".to_string()
                        }
                        _ => "Cannot start tournament".to_string(),
                    }
                })
            }
        }
    };

    match result {
        Err(message) => send_error(app, conn, &message).await,
        Ok(()) => {
            info!(tournament_id = %tournament_id, "tournament started");
            fan_update(app, &tournament_id).await;
            broadcast_tournament_list(app).await;
            advance_and_launch(app, &tournament_id).await;
        }
    }
}

/// Engine-reported result of a tournament room.
pub async fn handle_match_end(app: &AppState, tournament_id: &str, winner_conn: u64) {
    let outcome = {
        let mut inner = app.director.inner.lock().await;
        inner
            .tournaments
            .get_mut(tournament_id)
            .and_then(|t| t.record_result(winner_conn))
    };
    match outcome {
        Some(outcome) => process_result(app, tournament_id, outcome, true).await,
        None => warn!(
            tournament_id,
            winner_conn, "match result for a tournament without an active node"
        ),
    }
}

/// Explicit withdrawal via `leave_tournament`.
pub async fn handle_leave(app: &AppState, conn: u64) {
    let Some(tournament_id) = app.director.member_tournament(conn).await else {
        send_error(app, conn, "You are not in a tournament").await;
        return;
    };

    // A leaver mid-match loses their tournament room first so the engine
    // cannot race a result in while the forfeit is recorded. A regular
    // queue match they might be playing is left alone.
    if let Some(room) = app.manager.room_of(conn).await {
        if app.manager.tournament_of_room(&room).await.as_deref() == Some(tournament_id.as_str())
        {
            manager::teardown_match_for(app, conn).await;
        }
    }
    remove_member(app, conn, &tournament_id).await;

    let state = if app.manager.in_running_match(conn).await {
        ConnState::InMatch
    } else {
        ConnState::Idle
    };
    app.hub.set_state(conn, state).await;
    app.hub
        .send(
            conn,
            ServerMessage::TournamentLeft {
                message: "You have left the tournament".to_string(),
            },
        )
        .await;
}

/// Disconnect cascade entry point; the match room was already torn down.
pub async fn handle_disconnect(app: &AppState, conn: u64) {
    if let Some(tournament_id) = app.director.member_tournament(conn).await {
        remove_member(app, conn, &tournament_id).await;
    }
}

enum Removal {
    Gone,
    Cancelled { others: Vec<u64> },
    Removed {
        forfeit: Option<MatchOutcome>,
        now_empty: bool,
    },
}

async fn remove_member(app: &AppState, conn: u64, tournament_id: &str) {
    let removal = {
        let mut inner = app.director.inner.lock().await;
        inner.members.remove(&conn);
        match inner.tournaments.get_mut(tournament_id) {
            None => Removal::Gone,
            Some(t) if t.creator == conn && !t.started => {
                let others: Vec<u64> = t
                    .players
                    .iter()
                    .map(|p| p.conn)
                    .filter(|c| *c != conn)
                    .collect();
                inner.tournaments.remove(tournament_id);
                for other in &others {
                    inner.members.remove(other);
                }
                Removal::Cancelled { others }
            }
            Some(t) => {
                let forfeit = t.remove_player(conn).and_then(|r| r.forfeit);
                let now_empty = t.is_empty();
                if now_empty {
                    inner.tournaments.remove(tournament_id);
                }
                Removal::Removed { forfeit, now_empty }
            }
        }
    };

    match removal {
        Removal::Gone => {}
        Removal::Cancelled { others } => {
            info!(tournament_id, "tournament cancelled by its creator");
            for other in others {
                app.hub
                    .send(
                        other,
                        ServerMessage::TournamentLeft {
                            message: "Tournament has been canceled by the creator.".to_string(),
                        },
                    )
                    .await;
                app.hub.set_state(other, ConnState::Idle).await;
            }
            broadcast_tournament_list(app).await;
        }
        Removal::Removed { forfeit, now_empty } => {
            info!(tournament_id, conn_id = conn, "player removed from tournament");
            if let Some(outcome) = forfeit {
                // The leaver is gone; only the opponent hears about the walkover.
                process_result(app, tournament_id, outcome, false).await;
            } else if !now_empty {
                fan_update(app, tournament_id).await;
            }
            if now_empty {
                info!(tournament_id, "tournament is empty; removing");
            }
            broadcast_tournament_list(app).await;
        }
    }
}

// Fan out one recorded result: personal verdicts, completion announcements,
// the refreshed bracket, and the next step.
async fn process_result(
    app: &AppState,
    tournament_id: &str,
    outcome: MatchOutcome,
    notify_loser: bool,
) {
    info!(
        tournament_id,
        winner = %outcome.winner.nickname,
        loser = %outcome.loser.nickname,
        complete = outcome.tournament_complete,
        "tournament match recorded"
    );

    app.hub
        .send(
            outcome.winner.conn,
            ServerMessage::TournamentMatchResult {
                won: true,
                opponent: outcome.loser.nickname.clone(),
                tournament_complete: outcome.tournament_complete,
            },
        )
        .await;
    if notify_loser {
        app.hub
            .send(
                outcome.loser.conn,
                ServerMessage::TournamentEliminated {
                    winner: outcome.winner.nickname.clone(),
                },
            )
            .await;
    }

    if outcome.tournament_complete {
        for conn in app.director.entrant_conns(tournament_id).await {
            if conn == outcome.winner.conn {
                app.hub.send(conn, ServerMessage::TournamentVictory).await;
            } else {
                app.hub
                    .send(
                        conn,
                        ServerMessage::TournamentComplete {
                            winner: outcome.winner.nickname.clone(),
                        },
                    )
                    .await;
            }
        }
        fan_update(app, tournament_id).await;
        finish_tournament(app, tournament_id).await;
    } else {
        fan_update(app, tournament_id).await;
        broadcast_tournament_list(app).await;
        schedule_advance(app.clone(), tournament_id.to_string());
    }
}

// Let clients digest the result frame before the next match starts.
fn schedule_advance(app: AppState, tournament_id: String) {
    tokio::spawn(async move {
        tokio::time::sleep(config::TOURNAMENT_ADVANCE_DELAY).await;
        advance_and_launch(&app, &tournament_id).await;
    });
}

enum Advance {
    Launch { p1: Entrant, p2: Entrant, rounds: u32 },
    Stalled,
    Nothing,
}

/// Pick the next playable node and launch it, forfeiting nodes whose
/// occupants are no longer connected.
pub async fn advance_and_launch(app: &AppState, tournament_id: &str) {
    let decision = {
        let mut inner = app.director.inner.lock().await;
        match inner.tournaments.get_mut(tournament_id) {
            None => Advance::Nothing,
            Some(t) if t.winner.is_some() => Advance::Nothing,
            Some(t) => {
                let rounds = t.rounds;
                // Clone out of the selection so the borrow ends here.
                let selected = t
                    .select_next()
                    .map(|node| (node.slots[0].clone(), node.slots[1].clone()));
                match selected {
                    Some((Some(p1), Some(p2))) => Advance::Launch { p1, p2, rounds },
                    Some(_) => Advance::Stalled,
                    None if t.started && !t.has_selectable() => Advance::Stalled,
                    None => Advance::Nothing,
                }
            }
        }
    };

    match decision {
        Advance::Nothing => {}
        Advance::Launch { p1, p2, rounds } => {
            // A slot occupant may have vanished while the node waited.
            let absent = if !app.hub.is_registered(p1.conn).await {
                Some(p1.conn)
            } else if !app.hub.is_registered(p2.conn).await {
                Some(p2.conn)
            } else {
                None
            };
            if let Some(absent) = absent {
                warn!(tournament_id, conn_id = absent, "slot occupant gone; forfeiting node");
                let outcome = {
                    let mut inner = app.director.inner.lock().await;
                    inner
                        .tournaments
                        .get_mut(tournament_id)
                        .and_then(|t| t.forfeit_active(absent))
                };
                if let Some(outcome) = outcome {
                    process_result(app, tournament_id, outcome, false).await;
                }
                return;
            }
            launch_match(app, tournament_id, p1, p2, rounds).await;
        }
        Advance::Stalled => resolve_stalled(app, tournament_id).await,
    }
}

async fn launch_match(app: &AppState, tournament_id: &str, p1: Entrant, p2: Entrant, rounds: u32) {
    let room = format!("tourney_game_{}", Uuid::new_v4());
    info!(
        tournament_id,
        room = %room,
        player1 = %p1.nickname,
        player2 = %p2.nickname,
        "starting tournament match"
    );

    app.manager
        .create(&room, rounds, Some(tournament_id.to_string()))
        .await;
    app.manager
        .attach(
            &room,
            PlayerSlot {
                conn: p1.conn,
                nickname: p1.nickname.clone(),
            },
            Some(Side::Left),
        )
        .await;
    app.manager
        .attach(
            &room,
            PlayerSlot {
                conn: p2.conn,
                nickname: p2.nickname.clone(),
            },
            Some(Side::Right),
        )
        .await;

    let message = format!("Tournament match: {} vs {}", p1.nickname, p2.nickname);
    for (entrant, side) in [(&p1, Side::Left), (&p2, Side::Right)] {
        app.hub
            .send(
                entrant.conn,
                ServerMessage::TournamentMatchReady {
                    message: message.clone(),
                },
            )
            .await;
        app.hub
            .send(
                entrant.conn,
                ServerMessage::StartGame {
                    message: message.clone(),
                    room: room.clone(),
                    rounds,
                    is_tournament: true,
                    player_side: side.as_str(),
                },
            )
            .await;
        app.hub.set_state(entrant.conn, ConnState::InTournamentMatch).await;
    }

    fan_update(app, tournament_id).await;
    if app.manager.start(&room).await {
        app.metrics.games_started.record();
    } else {
        // A player dropped between selection and start; their disconnect
        // cascade records the forfeit and re-advances.
        warn!(tournament_id, room = %room, "failed to start tournament match");
    }
}

// The bracket is wedged: no playable node and no champion. Salvage the
// deepest recorded winner if there is one; otherwise close the tournament.
async fn resolve_stalled(app: &AppState, tournament_id: &str) {
    let resolved = {
        let mut inner = app.director.inner.lock().await;
        inner
            .tournaments
            .get_mut(tournament_id)
            .and_then(|t| t.resolve_stalled())
    };

    match resolved {
        Some(winner) => {
            warn!(tournament_id, winner = %winner, "bracket stalled; completing with best-known winner");
            for conn in app.director.entrant_conns(tournament_id).await {
                app.hub
                    .send(
                        conn,
                        ServerMessage::TournamentComplete {
                            winner: winner.clone(),
                        },
                    )
                    .await;
            }
            fan_update(app, tournament_id).await;
            finish_tournament(app, tournament_id).await;
        }
        None => {
            warn!(tournament_id, "bracket stalled with no recorded winner; disposing");
            for conn in app.director.entrant_conns(tournament_id).await {
                app.hub
                    .send(
                        conn,
                        ServerMessage::TournamentLeft {
                            message: "Tournament has been closed.".to_string(),
                        },
                    )
                    .await;
            }
            finish_tournament(app, tournament_id).await;
        }
    }
}

// Remove the tournament and release every remaining member.
async fn finish_tournament(app: &AppState, tournament_id: &str) {
    let members: Vec<u64> = {
        let mut inner = app.director.inner.lock().await;
        if inner.tournaments.remove(tournament_id).is_none() {
            return;
        }
        let members: Vec<u64> = inner
            .members
            .iter()
            .filter(|(_, id)| id.as_str() == tournament_id)
            .map(|(conn, _)| *conn)
            .collect();
        for conn in &members {
            inner.members.remove(conn);
        }
        members
    };
    for conn in members {
        app.hub.set_state(conn, ConnState::Idle).await;
    }
    info!(tournament_id, "tournament finished");
    broadcast_tournament_list(app).await;
}
