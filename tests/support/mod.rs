// Shared primitives for one-time server bootstrapping across integration
// tests, plus a small websocket client for driving the wire protocol.
#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

// Global host:port published once the server thread has bound its listener.
static SERVER_ADDR: OnceLock<String> = OnceLock::new();
// One-time guard that ensures the server bootstrap path runs only once.
static SERVER_READY: OnceLock<()> = OnceLock::new();

// Ensure the test server is running and return the shared host:port.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_addr = Arc::new(OnceLock::<String>::new());
        let published_addr_thread = Arc::clone(&published_addr);
        // Spawn an OS thread so the server outlives individual `#[tokio::test]` runtimes.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                // Bind to an ephemeral port to avoid collisions with local services.
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_addr_thread.set(addr.to_string());
                pong_server::run(listener).await.expect("server failed");
            });
        });
        wait_for_server(published_addr);
    });

    SERVER_ADDR
        .get()
        .expect("server addr should be initialized")
        .as_str()
}

// Wait for address publication, then for the socket to accept connections.
fn wait_for_server(published_addr: Arc<OnceLock<String>>) {
    let addr = loop {
        if let Some(addr) = published_addr.get() {
            break addr.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_ADDR.set(addr.clone());

    for _ in 0..100 {
        if std::net::TcpStream::connect(&addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// One websocket client connection speaking the JSON frame protocol.
pub struct WsClient {
    socket: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WsClient {
    pub async fn connect() -> Self {
        let addr = ensure_server();
        let (socket, _) = connect_async(format!("ws://{addr}/ws"))
            .await
            .expect("websocket connect");
        Self { socket }
    }

    pub async fn send(&mut self, frame: Value) {
        self.socket
            .send(Message::Text(frame.to_string().into()))
            .await
            .expect("websocket send");
    }

    /// Raw text frame, for exercising the malformed-input paths.
    pub async fn socket_send_text(&mut self, text: &str) {
        self.socket
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("websocket send");
    }

    /// Next text frame as JSON, within the default timeout.
    pub async fn recv(&mut self) -> Value {
        self.try_recv_within(RECV_TIMEOUT)
            .await
            .expect("frame within timeout")
    }

    /// Next text frame within `timeout`, or None when nothing arrives.
    pub async fn try_recv_within(&mut self, timeout: Duration) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let incoming = tokio::time::timeout_at(deadline, self.socket.next())
                .await
                .ok()??;
            let message = incoming.expect("websocket frame");
            match message {
                Message::Text(text) => {
                    return Some(serde_json::from_str(text.as_str()).expect("frame is JSON"));
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => return None,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    /// Skip frames until one of the wanted `type` arrives.
    pub async fn recv_type(&mut self, kind: &str) -> Value {
        self.recv_type_within(kind, RECV_TIMEOUT).await
    }

    pub async fn recv_type_within(&mut self, kind: &str, timeout: Duration) -> Value {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .unwrap_or_else(|| panic!("no {kind} frame within timeout"));
            match self.try_recv_within(remaining).await {
                Some(frame) => {
                    if frame["type"] == kind {
                        return frame;
                    }
                }
                None => panic!("connection closed while waiting for {kind}"),
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.socket.close(None).await;
    }
}

/// Unique nickname so concurrently running tests never collide.
pub fn unique_nickname(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..8])
}
