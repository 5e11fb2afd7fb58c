//! In-process backend for session tests.
//!
//! Serves `/{owner}/{repo}/{client_id}` over WebSocket on a random local port,
//! reports what it sees as [`BackendEvent`]s and lets tests push frames to the
//! connected client.

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::manager::SessionConfig;

/// Timeout for each awaited event in tests.
pub(crate) const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BackendEvent {
    Connected {
        owner: String,
        repo: String,
        client_id: String,
    },
    Received(String),
    Disconnected,
}

/// How the mock backend behaves per connection.
#[derive(Clone, Default)]
pub(crate) struct Script {
    /// Delay before answering the WebSocket handshake
    pub handshake_delay: Duration,
    /// Frames sent right after the socket opens
    pub greeting: Vec<String>,
    /// Reply to every non-keepalive message with this prefix + the message
    pub reply_prefix: Option<String>,
}

/// Server-initiated traffic, fanned out to every open socket.
#[derive(Debug, Clone)]
enum Push {
    Text(String),
    Close,
}

#[derive(Clone)]
struct MockState {
    script: Script,
    events: mpsc::UnboundedSender<BackendEvent>,
    push: broadcast::Sender<Push>,
}

pub(crate) struct MockBackend {
    pub addr: SocketAddr,
    events: mpsc::UnboundedReceiver<BackendEvent>,
    push: broadcast::Sender<Push>,
    _shutdown: oneshot::Sender<()>,
}

impl MockBackend {
    pub async fn start(script: Script) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (push, _) = broadcast::channel(64);
        let state = MockState {
            script,
            events: events_tx,
            push: push.clone(),
        };

        let app = Router::new()
            .route("/{owner}/{repo}/{client_id}", get(ws_handler))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            events,
            push,
            _shutdown: tx,
        }
    }

    pub fn base_endpoint(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Session config pointed at this backend.
    pub fn config(&self) -> SessionConfig {
        SessionConfig {
            base_endpoint: self.base_endpoint(),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    /// Send a frame to every connected client.
    pub fn push(&self, text: &str) {
        self.push.send(Push::Text(text.to_string())).unwrap();
    }

    /// Close every open socket from the server side.
    pub fn close_clients(&self) {
        self.push.send(Push::Close).unwrap();
    }

    pub async fn next_event(&mut self) -> BackendEvent {
        tokio::time::timeout(TEST_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for backend event")
            .expect("backend event channel closed")
    }

    /// Skip events until one matches.
    pub async fn expect_event(&mut self, wanted: &BackendEvent) {
        loop {
            if &self.next_event().await == wanted {
                return;
            }
        }
    }

    /// Wait for the next connection and return its client id.
    pub async fn expect_connected(&mut self) -> String {
        loop {
            if let BackendEvent::Connected { client_id, .. } = self.next_event().await {
                return client_id;
            }
        }
    }

    /// Events that arrive within `window`.
    pub async fn drain_for(&mut self, window: Duration) -> Vec<BackendEvent> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, self.events.recv()).await {
            seen.push(event);
        }
        seen
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((owner, repo, client_id)): Path<(String, String, String)>,
    State(state): State<MockState>,
) -> Response {
    if !state.script.handshake_delay.is_zero() {
        tokio::time::sleep(state.script.handshake_delay).await;
    }
    ws.on_upgrade(move |socket| handle_socket(socket, owner, repo, client_id, state))
}

async fn handle_socket(
    mut socket: WebSocket,
    owner: String,
    repo: String,
    client_id: String,
    state: MockState,
) {
    let mut push_rx = state.push.subscribe();
    let _ = state.events.send(BackendEvent::Connected {
        owner,
        repo,
        client_id,
    });

    for frame in &state.script.greeting {
        if socket.send(Message::Text(frame.clone().into())).await.is_err() {
            let _ = state.events.send(BackendEvent::Disconnected);
            return;
        }
    }

    loop {
        tokio::select! {
            Ok(push) = push_rx.recv() => match push {
                Push::Text(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Push::Close => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let text = text.to_string();
                    let _ = state.events.send(BackendEvent::Received(text.clone()));
                    if text == "ping" {
                        continue;
                    }
                    if let Some(prefix) = &state.script.reply_prefix {
                        let reply = format!("{prefix}{text}");
                        if socket.send(Message::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    }

    let _ = state.events.send(BackendEvent::Disconnected);
}

/// A TCP listener that accepts connections but never answers the WebSocket
/// handshake. Keep the returned task alive for the duration of the test.
pub(crate) async fn silent_listener() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    (addr, task)
}

/// A TCP listener that answers every connection with plain HTTP and hangs
/// up, so a TLS client sees a broken handshake.
pub(crate) async fn plaintext_listener() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    use tokio::io::AsyncWriteExt;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream
                .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                .await;
            let _ = stream.shutdown().await;
        }
    });
    (addr, task)
}
