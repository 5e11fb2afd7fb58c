//! Scripted WebSocket backend for CLI tests.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use repo_session::SessionConfig;
use std::net::SocketAddr;
use std::time::Duration;

pub(crate) const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends `greeting` on open, then answers every message with `echo: <text>`.
#[derive(Clone, Default)]
pub(crate) struct Backend {
    pub greeting: Vec<String>,
    pub close_after_greeting: bool,
}

impl Backend {
    pub fn greeting(frames: &[&str]) -> Self {
        Self {
            greeting: frames.iter().map(|f| f.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn session_config(addr: SocketAddr) -> SessionConfig {
        SessionConfig {
            base_endpoint: format!("ws://{addr}"),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    pub async fn spawn(self) -> SocketAddr {
        let app = Router::new()
            .route("/{owner}/{repo}/{client_id}", get(ws_handler))
            .with_state(self);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(backend): State<Backend>) -> Response {
    ws.on_upgrade(move |socket| serve(socket, backend))
}

async fn serve(mut socket: WebSocket, backend: Backend) {
    for frame in &backend.greeting {
        if socket.send(Message::Text(frame.clone().into())).await.is_err() {
            return;
        }
    }
    if backend.close_after_greeting {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) if text.as_str() == "ping" => {}
            Message::Text(text) => {
                let reply = format!("echo: {}", text.as_str());
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}
