// Websocket endpoint: connection bootstrap, inbound routing, the outbound
// writer task, and the disconnect cascade.

use crate::frameworks::config;
use crate::interface_adapters::protocol::{ClientMessage, MESSAGE_KINDS, ServerMessage};
use crate::interface_adapters::state::AppState;
use crate::use_cases::hub::{ConnectionHandle, OutboundFrame, next_conn_id};
use crate::use_cases::{director, manager, matchmaking};

use axum::{
    extract::{
        State,
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, error, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

async fn handle_socket(socket: WebSocket, app: AppState) {
    let conn_id = next_conn_id();

    let (frames_tx, frames_rx) = mpsc::channel(config::OUTBOUND_QUEUE_CAPACITY);
    let (snapshot_tx, snapshot_rx) = watch::channel(Utf8Bytes::from(""));
    let close = Arc::new(Notify::new());
    let handle = ConnectionHandle {
        id: conn_id,
        frames_tx,
        snapshot_tx,
        close: close.clone(),
    };

    app.hub.register(handle).await;
    app.metrics.ws_connections.inc();
    info!(conn_id, "client connected");

    let (sink, stream) = socket.split();
    tokio::spawn(write_outbound(sink, frames_rx, snapshot_rx, close.clone()));

    // Initial lobby snapshot: who is waiting, which tournaments exist.
    let frame = app.matchmaking.waiting_list_frame().await;
    app.hub.send(conn_id, frame).await;
    let frame = app.director.tournament_list_frame().await;
    app.hub.send(conn_id, frame).await;

    read_inbound(stream, conn_id, &app, &close).await;

    disconnect_cleanup(&app, conn_id).await;
    // Wake the writer so it drops the sink and the socket closes.
    close.notify_waiters();
}

// Serialized outbound path: control frames in enqueue order, interleaved
// with the freshest snapshot. A slow client lags on snapshots only; a write
// failure closes the connection.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut frames_rx: mpsc::Receiver<OutboundFrame>,
    mut snapshot_rx: watch::Receiver<Utf8Bytes>,
    close: Arc<Notify>,
) {
    let mut closed = std::pin::pin!(close.notified());
    closed.as_mut().enable();

    loop {
        let text: Utf8Bytes = tokio::select! {
            _ = &mut closed => break,
            frame = frames_rx.recv() => match frame {
                Some(OutboundFrame::Message(message)) => {
                    match serde_json::to_string(&message) {
                        Ok(text) => text.into(),
                        Err(e) => {
                            error!(error = %e, "failed to serialize outbound frame");
                            continue;
                        }
                    }
                }
                Some(OutboundFrame::Raw(bytes)) => bytes,
                None => break,
            },
            changed = snapshot_rx.changed() => match changed {
                Ok(()) => {
                    let bytes = snapshot_rx.borrow_and_update().clone();
                    if bytes.is_empty() {
                        continue;
                    }
                    bytes
                }
                // All snapshot senders are gone; the connection is tearing down.
                Err(_) => break,
            },
        };

        if sink.send(Message::Text(text)).await.is_err() {
            close.notify_waiters();
            break;
        }
    }

    let _ = sink.close().await;
}

async fn read_inbound(
    mut stream: SplitStream<WebSocket>,
    conn_id: u64,
    app: &AppState,
    close: &Arc<Notify>,
) {
    let mut closed = std::pin::pin!(close.notified());
    closed.as_mut().enable();

    loop {
        tokio::select! {
            _ = &mut closed => break,
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => route_frame(app, conn_id, &text).await,
                Some(Ok(Message::Binary(_))) => {
                    // Text-only protocol; binary frames are dropped.
                    debug!(conn_id, "binary frame ignored");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => break,
                Some(Err(e)) => {
                    warn!(conn_id, error = %e, "websocket recv error");
                    break;
                }
                None => break,
            }
        }
    }
}

async fn route_frame(app: &AppState, conn_id: u64, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => {
            app.metrics.record_message(message.kind());
            dispatch(app, conn_id, message).await;
        }
        Err(parse_err) => {
            // A frame with an unrecognized `type` is dropped silently; a
            // known type with a broken payload (or no JSON at all) is logged.
            let tag = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from));
            match tag {
                Some(tag) if !MESSAGE_KINDS.contains(&tag.as_str()) => {
                    app.metrics.record_unknown_message();
                    debug!(conn_id, %tag, "unknown message type ignored");
                }
                _ => {
                    app.metrics.record_malformed_message();
                    warn!(conn_id, error = %parse_err, "malformed frame dropped");
                }
            }
        }
    }
}

async fn dispatch(app: &AppState, conn_id: u64, message: ClientMessage) {
    match message {
        ClientMessage::Join {
            nickname, rounds, ..
        } => matchmaking::handle_join(app, conn_id, nickname, rounds).await,
        ClientMessage::LeaveQueue => matchmaking::handle_leave_queue(app, conn_id).await,
        ClientMessage::GameUpdate { data } => {
            app.manager.set_paddle(conn_id, data.paddle_y).await;
        }
        ClientMessage::GameOver => {
            // The engine reports results itself; a client's claim is noise.
            debug!(conn_id, "client game_over ignored; engine is authoritative");
        }
        ClientMessage::CreateTournament {
            nickname,
            name,
            rounds,
            size,
        } => director::handle_create(app, conn_id, nickname, name, rounds, size).await,
        ClientMessage::JoinTournament {
            tournament_id,
            nickname,
        } => director::handle_join(app, conn_id, tournament_id, nickname).await,
        ClientMessage::StartTournament { tournament_id } => {
            director::handle_start(app, conn_id, tournament_id).await;
        }
        ClientMessage::LeaveTournament => director::handle_leave(app, conn_id).await,
        ClientMessage::GetTournaments => {
            let frame = app.director.tournament_list_frame().await;
            app.hub.send(conn_id, frame).await;
        }
        ClientMessage::GetState => handle_get_state(app, conn_id).await,
    }
}

// Lobby snapshot to the requester only, plus best-effort resends of their
// tournament state and latest match snapshot.
async fn handle_get_state(app: &AppState, conn_id: u64) {
    let frame = app.matchmaking.waiting_list_frame().await;
    app.hub.send(conn_id, frame).await;
    let frame = app.director.tournament_list_frame().await;
    app.hub.send(conn_id, frame).await;

    if let Some(tournament_id) = app.director.member_tournament(conn_id).await {
        if let Some(tournament) = app.director.state_dto(&tournament_id).await {
            app.hub
                .send(conn_id, ServerMessage::TournamentUpdate { tournament })
                .await;
        }
    }

    if let Some(bytes) = app.manager.latest_snapshot(conn_id).await {
        app.hub.send_raw(conn_id, bytes).await;
    }
}

// Cascade: queue entry, match slot, tournament membership, registry entry.
// The match room goes before the tournament so a forfeit can never race the
// still-running engine.
async fn disconnect_cleanup(app: &AppState, conn_id: u64) {
    if app.matchmaking.remove(conn_id).await {
        app.metrics.waiting_players.dec();
        matchmaking::broadcast_waiting_list(app).await;
    }

    manager::teardown_match_for(app, conn_id).await;
    director::handle_disconnect(app, conn_id).await;

    let nickname = app.hub.unregister(conn_id).await;
    app.metrics.ws_connections.dec();
    info!(
        conn_id,
        nickname = nickname.as_deref().unwrap_or(""),
        "client disconnected"
    );
    app.metrics.log_summary();
}
