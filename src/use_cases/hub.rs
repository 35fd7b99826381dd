// Connection hub: registry of live clients and the lobby broadcast group.

use crate::interface_adapters::protocol::ServerMessage;
use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Notify, RwLock, mpsc, watch};
use tracing::{debug, warn};

/// Where a connection currently stands in the lobby/match lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Queued,
    InMatch,
    InTournamentLobby,
    InTournamentMatch,
}

/// One frame on a connection's serialized outbound path.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Message(ServerMessage),
    /// Pre-serialized text, used to replay the latest match snapshot.
    Raw(Utf8Bytes),
}

/// Cheap-to-clone addressing handle for one client connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: u64,
    /// Bounded control-frame queue drained by the connection's writer task.
    pub frames_tx: mpsc::Sender<OutboundFrame>,
    /// Latest game snapshot; an outpaced client skips straight to this.
    pub snapshot_tx: watch::Sender<Utf8Bytes>,
    /// Fires when the connection must shut down (write failure, overflow).
    pub close: Arc<Notify>,
}

#[derive(Debug)]
struct ConnEntry {
    handle: ConnectionHandle,
    nickname: Option<String>,
    state: ConnState,
}

/// Process-unique, monotonically increasing connection id.
pub fn next_conn_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Thread-safe registry of connected clients.
///
/// Every registered connection is implicitly a member of the lobby broadcast
/// group; broadcasts are best-effort and close subscribers that cannot keep
/// up.
#[derive(Debug, Default)]
pub struct Hub {
    connections: RwLock<HashMap<u64, ConnEntry>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, handle: ConnectionHandle) {
        let mut connections = self.connections.write().await;
        connections.insert(
            handle.id,
            ConnEntry {
                handle,
                nickname: None,
                state: ConnState::Idle,
            },
        );
    }

    /// Remove a connection; returns its last known nickname.
    pub async fn unregister(&self, conn: u64) -> Option<String> {
        let mut connections = self.connections.write().await;
        connections.remove(&conn).and_then(|entry| entry.nickname)
    }

    pub async fn handle(&self, conn: u64) -> Option<ConnectionHandle> {
        let connections = self.connections.read().await;
        connections.get(&conn).map(|entry| entry.handle.clone())
    }

    pub async fn is_registered(&self, conn: u64) -> bool {
        self.connections.read().await.contains_key(&conn)
    }

    pub async fn set_nickname(&self, conn: u64, nickname: &str) {
        let mut connections = self.connections.write().await;
        if let Some(entry) = connections.get_mut(&conn) {
            entry.nickname = Some(nickname.to_string());
        }
    }

    pub async fn nickname(&self, conn: u64) -> Option<String> {
        let connections = self.connections.read().await;
        connections.get(&conn).and_then(|entry| entry.nickname.clone())
    }

    pub async fn set_state(&self, conn: u64, state: ConnState) {
        let mut connections = self.connections.write().await;
        if let Some(entry) = connections.get_mut(&conn) {
            entry.state = state;
        }
    }

    pub async fn state(&self, conn: u64) -> Option<ConnState> {
        let connections = self.connections.read().await;
        connections.get(&conn).map(|entry| entry.state)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Enqueue a control frame for one connection.
    ///
    /// Control frames are never silently dropped: a connection whose queue
    /// is full (or gone) is closed instead, which cascades into cleanup.
    pub async fn send(&self, conn: u64, message: ServerMessage) -> bool {
        let handle = {
            let connections = self.connections.read().await;
            match connections.get(&conn) {
                Some(entry) => entry.handle.clone(),
                None => return false,
            }
        };
        deliver(&handle, OutboundFrame::Message(message))
    }

    /// Enqueue pre-serialized text for one connection.
    pub async fn send_raw(&self, conn: u64, bytes: Utf8Bytes) -> bool {
        let handle = {
            let connections = self.connections.read().await;
            match connections.get(&conn) {
                Some(entry) => entry.handle.clone(),
                None => return false,
            }
        };
        deliver(&handle, OutboundFrame::Raw(bytes))
    }

    /// Fan a frame out to every lobby subscriber.
    pub async fn broadcast(&self, message: &ServerMessage) {
        let handles: Vec<ConnectionHandle> = {
            let connections = self.connections.read().await;
            connections
                .values()
                .map(|entry| entry.handle.clone())
                .collect()
        };
        debug!(subscribers = handles.len(), "lobby broadcast");
        for handle in handles {
            deliver(&handle, OutboundFrame::Message(message.clone()));
        }
    }
}

// Non-blocking enqueue so one slow client can never stall a sender.
fn deliver(handle: &ConnectionHandle, frame: OutboundFrame) -> bool {
    match handle.frames_tx.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(conn_id = handle.id, "outbound queue overflow; closing connection");
            handle.close.notify_waiters();
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            handle.close.notify_waiters();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handle(id: u64, capacity: usize) -> (ConnectionHandle, mpsc::Receiver<OutboundFrame>) {
        let (frames_tx, frames_rx) = mpsc::channel(capacity);
        let (snapshot_tx, _snapshot_rx) = watch::channel(Utf8Bytes::from(""));
        (
            ConnectionHandle {
                id,
                frames_tx,
                snapshot_tx,
                close: Arc::new(Notify::new()),
            },
            frames_rx,
        )
    }

    #[tokio::test]
    async fn register_send_unregister_roundtrip() {
        let hub = Hub::new();
        let (handle, mut frames_rx) = test_handle(7, 8);
        hub.register(handle).await;
        hub.set_nickname(7, "ada").await;

        assert!(
            hub.send(
                7,
                ServerMessage::QueueUpdate {
                    message: "hi".to_string()
                }
            )
            .await
        );
        assert!(matches!(
            frames_rx.recv().await,
            Some(OutboundFrame::Message(ServerMessage::QueueUpdate { .. }))
        ));

        assert_eq!(hub.unregister(7).await.as_deref(), Some("ada"));
        assert!(!hub.send(7, ServerMessage::TournamentVictory).await);
    }

    #[tokio::test]
    async fn overflowing_subscriber_is_closed() {
        let hub = Hub::new();
        let (handle, _frames_rx) = test_handle(1, 1);
        let close = handle.close.clone();
        hub.register(handle).await;

        let mut notified = std::pin::pin!(close.notified());
        notified.as_mut().enable();
        assert!(hub.send(1, ServerMessage::TournamentVictory).await);
        assert!(!hub.send(1, ServerMessage::TournamentVictory).await);
        notified.await;
    }

    #[tokio::test]
    async fn state_transitions_are_tracked() {
        let hub = Hub::new();
        let (handle, _frames_rx) = test_handle(3, 8);
        hub.register(handle).await;
        assert_eq!(hub.state(3).await, Some(ConnState::Idle));
        hub.set_state(3, ConnState::Queued).await;
        assert_eq!(hub.state(3).await, Some(ConnState::Queued));
    }
}
