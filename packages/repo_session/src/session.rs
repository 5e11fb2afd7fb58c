use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::error::ConnectionError;
use crate::frame::Frame;
use crate::manager::{ConnectionManager, SessionConfig, SessionSnapshot, SessionState};
use crate::target::{ClientId, RepoTarget};

/// Caller-owned handle to one chat session.
///
/// Construct it explicitly and pass it (or a clone) to whatever needs it.
/// Every method forwards to the underlying [`ConnectionManager`]. When the
/// last clone is dropped the session disconnects.
#[derive(Clone)]
pub struct Session {
    manager: Arc<ConnectionManager>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new(config)),
        }
    }

    pub async fn connect(&self, target: RepoTarget) -> Result<(), ConnectionError> {
        self.manager.connect(target).await
    }

    pub async fn connect_parts(&self, owner: &str, repo: &str) -> Result<(), ConnectionError> {
        self.manager.connect_parts(owner, repo).await
    }

    pub fn disconnect(&self) {
        self.manager.disconnect()
    }

    pub fn send(&self, text: impl Into<String>) {
        self.manager.send(text)
    }

    pub fn state(&self) -> SessionState {
        self.manager.state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.manager.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.manager.subscribe()
    }

    pub fn frames(&self) -> broadcast::Receiver<Frame> {
        self.manager.frames()
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.manager.client_id()
    }

    pub fn config(&self) -> &SessionConfig {
        self.manager.config()
    }
}
