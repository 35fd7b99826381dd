// Queue orchestration: join/leave flows and pairing into match rooms.

use crate::domain::pong::Side;
use crate::domain::queue::{JoinOutcome, MatchQueue, QueueEntry, QueueError};
use crate::interface_adapters::protocol::{ServerMessage, WaitingPlayerDto};
use crate::interface_adapters::state::AppState;
use crate::use_cases::hub::ConnState;
use crate::use_cases::manager::PlayerSlot;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Mutex-guarded matchmaking queue shared by all connections.
#[derive(Debug, Default)]
pub struct Matchmaking {
    queue: Mutex<MatchQueue>,
}

impl Matchmaking {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(MatchQueue::new()),
        }
    }

    /// Remove a waiting entry; true if the player was actually queued.
    pub async fn remove(&self, conn: u64) -> bool {
        self.queue.lock().await.remove(conn)
    }

    pub async fn waiting_count(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn waiting_list_frame(&self) -> ServerMessage {
        let queue = self.queue.lock().await;
        ServerMessage::WaitingList {
            waiting_list: queue.waiting_list().iter().map(WaitingPlayerDto::from).collect(),
        }
    }
}

pub async fn broadcast_waiting_list(app: &AppState) {
    let frame = app.matchmaking.waiting_list_frame().await;
    app.hub.broadcast(&frame).await;
}

/// `join`: queue up, or pair with the oldest waiter requesting the same
/// number of rounds.
pub async fn handle_join(app: &AppState, conn: u64, nickname: String, rounds: u32) {
    if app.manager.in_running_match(conn).await {
        app.hub
            .send(
                conn,
                ServerMessage::QueueUpdate {
                    message: "You are already in a game".to_string(),
                },
            )
            .await;
        return;
    }

    app.hub.set_nickname(conn, &nickname).await;

    let outcome = {
        let mut queue = app.matchmaking.queue.lock().await;
        queue.join(QueueEntry {
            conn,
            nickname: nickname.clone(),
            rounds,
        })
    };

    match outcome {
        Err(QueueError::AlreadyQueued) => {
            app.hub
                .send(
                    conn,
                    ServerMessage::QueueUpdate {
                        message: "You are already in the queue".to_string(),
                    },
                )
                .await;
        }
        Ok(JoinOutcome::Waiting) => {
            info!(conn_id = conn, nickname = %nickname, rounds, "player queued");
            app.hub.set_state(conn, ConnState::Queued).await;
            app.metrics.waiting_players.inc();
            app.hub
                .send(
                    conn,
                    ServerMessage::QueueUpdate {
                        message: format!("Waiting for a player... (Round amount: {rounds})"),
                    },
                )
                .await;
            broadcast_waiting_list(app).await;
        }
        Ok(JoinOutcome::Paired { opponent }) => {
            app.metrics.waiting_players.dec();
            let caller = PlayerSlot {
                conn,
                nickname: nickname.clone(),
            };
            let waiter = PlayerSlot {
                conn: opponent.conn,
                nickname: opponent.nickname.clone(),
            };
            start_paired_match(app, waiter, caller, rounds).await;
            broadcast_waiting_list(app).await;
        }
    }
}

/// `leave_queue`: drop the caller's entry and confirm.
pub async fn handle_leave_queue(app: &AppState, conn: u64) {
    let removed = app.matchmaking.remove(conn).await;
    if removed {
        info!(conn_id = conn, "player left the queue");
        app.hub.set_state(conn, ConnState::Idle).await;
        app.metrics.waiting_players.dec();
    }
    app.hub
        .send(
            conn,
            ServerMessage::QueueUpdate {
                message: "You have left the queue".to_string(),
            },
        )
        .await;
    if removed {
        broadcast_waiting_list(app).await;
    }
}

// The prior waiter takes LEFT, the joining caller RIGHT.
async fn start_paired_match(app: &AppState, left: PlayerSlot, right: PlayerSlot, rounds: u32) {
    let room = format!("game_{}", Uuid::new_v4());
    info!(
        room = %room,
        left = %left.nickname,
        right = %right.nickname,
        rounds,
        "pairing players"
    );

    app.manager.create(&room, rounds, None).await;
    app.manager.attach(&room, left.clone(), Some(Side::Left)).await;
    app.manager.attach(&room, right.clone(), Some(Side::Right)).await;

    let message = format!(
        "Game starting between {} and {}",
        left.nickname, right.nickname
    );
    for (slot, side) in [(&left, Side::Left), (&right, Side::Right)] {
        app.hub.set_state(slot.conn, ConnState::InMatch).await;
        app.hub
            .send(
                slot.conn,
                ServerMessage::StartGame {
                    message: message.clone(),
                    room: room.clone(),
                    rounds,
                    is_tournament: false,
                    player_side: side.as_str(),
                },
            )
            .await;
    }

    if app.manager.start(&room).await {
        app.metrics.games_started.record();
    } else {
        // One of the pair dropped mid-handshake; their disconnect cascade
        // detaches the room and notifies the survivor.
        warn!(room = %room, "failed to start paired match");
    }
}
