// Authoritative per-match simulation task.
//
// One task per running match owns the physics state, drains paddle inputs,
// and emits a snapshot every tick. It terminates on a win (reporting the
// result), on player loss (silently), or on room disposal.

use crate::domain::pong::{PongState, Side};
use crate::frameworks::config;
use crate::interface_adapters::protocol::{GameStateDto, ServerMessage};
use crate::use_cases::hub::{ConnectionHandle, OutboundFrame};
use axum::extract::ws::Utf8Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, error, info, warn};

/// Inputs consumed by the simulation between ticks.
#[derive(Debug, Clone)]
pub enum EngineInput {
    Paddle { side: Side, y: f64 },
    /// Stop simulating without producing a result (player slot emptied).
    Abort,
}

/// Delivery endpoints for one player slot.
#[derive(Debug, Clone)]
pub struct PlayerEndpoint {
    pub conn: u64,
    pub nickname: String,
    pub handle: ConnectionHandle,
}

/// Terminal report of a completed (won) match.
#[derive(Debug, Clone)]
pub struct MatchEnd {
    pub room: String,
    pub rounds: u32,
    pub winner: Side,
    pub winner_conn: u64,
    pub winner_nickname: String,
    pub loser_conn: u64,
    pub loser_nickname: String,
    pub winner_score: u32,
    pub duration: Duration,
}

pub struct EngineRun {
    pub room: String,
    pub rounds: u32,
    pub left: PlayerEndpoint,
    pub right: PlayerEndpoint,
    pub input_rx: mpsc::Receiver<EngineInput>,
    /// Match-level latest snapshot, kept for best-effort resends.
    pub state_tx: watch::Sender<Utf8Bytes>,
    pub shutdown: Arc<Notify>,
    pub end_tx: mpsc::Sender<MatchEnd>,
}

/// Drive one match to completion at the configured tick rate.
pub async fn match_task(mut run: EngineRun) {
    let mut sim = PongState::new(run.rounds);
    let mut interval = tokio::time::interval(config::TICK_INTERVAL);
    let started_at = Instant::now();
    let mut last_frame = Instant::now();

    info!(room = %run.room, rounds = run.rounds, "match engine started");

    let shutdown = run.shutdown.clone();
    let mut disposed = std::pin::pin!(shutdown.notified());
    disposed.as_mut().enable();

    loop {
        tokio::select! {
            _ = &mut disposed => {
                info!(room = %run.room, "match engine stopped by disposal");
                return;
            }
            _ = interval.tick() => {}
        }

        loop {
            match run.input_rx.try_recv() {
                Ok(EngineInput::Paddle { side, y }) => sim.set_paddle(side, y),
                Ok(EngineInput::Abort) => {
                    info!(room = %run.room, "match engine aborted");
                    return;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    warn!(room = %run.room, "engine input channel closed; stopping");
                    return;
                }
            }
        }

        // Scale by elapsed wall time so a late tick moves the ball further.
        let now = Instant::now();
        let delta_factor =
            (now - last_frame).as_secs_f64() / config::FRAME_DURATION.as_secs_f64();
        last_frame = now;

        if let Some(scorer) = sim.update(delta_factor) {
            debug!(
                room = %run.room,
                scorer = scorer.as_str(),
                left = sim.left_score,
                right = sim.right_score,
                "point scored"
            );
        }

        emit_snapshot(&run, &sim);

        if let Some(winner) = sim.winner {
            finish(&run, &sim, winner, started_at.elapsed()).await;
            return;
        }
    }
}

// Serialize the state once and fan the same bytes to both players plus the
// match-level watch.
fn emit_snapshot(run: &EngineRun, sim: &PongState) {
    let frame = ServerMessage::GameStateUpdate {
        state: GameStateDto::from(&sim.snapshot()),
    };
    let text = match serde_json::to_string(&frame) {
        Ok(text) => text,
        Err(e) => {
            error!(room = %run.room, error = %e, "failed to serialize snapshot");
            return;
        }
    };
    let bytes = Utf8Bytes::from(text);
    let _ = run.state_tx.send(bytes.clone());
    let _ = run.left.handle.snapshot_tx.send(bytes.clone());
    let _ = run.right.handle.snapshot_tx.send(bytes);
}

async fn finish(run: &EngineRun, sim: &PongState, winner: Side, duration: Duration) {
    let winner_score = sim.score(winner);
    info!(
        room = %run.room,
        winner = winner.as_str(),
        score = winner_score,
        duration_secs = duration.as_secs(),
        "match over"
    );

    // game_over is a control frame: never dropped in favor of snapshots. A
    // connection whose control queue is already full gets closed instead of
    // stalling the engine.
    let frame = OutboundFrame::Message(ServerMessage::game_over(winner_score, winner));
    for endpoint in [&run.left, &run.right] {
        if endpoint.handle.frames_tx.try_send(frame.clone()).is_err() {
            warn!(room = %run.room, conn_id = endpoint.conn, "game_over undeliverable; closing");
            endpoint.handle.close.notify_waiters();
        }
    }

    let (winner_end, loser_end) = match winner {
        Side::Left => (&run.left, &run.right),
        Side::Right => (&run.right, &run.left),
    };
    let end = MatchEnd {
        room: run.room.clone(),
        rounds: run.rounds,
        winner,
        winner_conn: winner_end.conn,
        winner_nickname: winner_end.nickname.clone(),
        loser_conn: loser_end.conn,
        loser_nickname: loser_end.nickname.clone(),
        winner_score,
        duration,
    };
    if run.end_tx.send(end).await.is_err() {
        warn!(room = %run.room, "match lifecycle channel closed; result dropped");
    }
}
