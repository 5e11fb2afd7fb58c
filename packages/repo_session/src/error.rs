use std::time::Duration;
use tokio_tungstenite::tungstenite;

use crate::frame::RejectReason;

/// Errors reported by a session.
///
/// Any of these implies the socket is closed and the session is no longer
/// connected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The socket did not open within the connect deadline
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// Socket-level failure (also used for a target that cannot be addressed)
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend refused the repository
    #[error("server rejected the repository: {0}")]
    ServerRejected(RejectReason),

    /// `disconnect` was called while the attempt was still in flight
    #[error("connection attempt cancelled")]
    Cancelled,
}

impl ConnectionError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Io(io_err) => {
                Self::Transport(format!("{} ({:?})", io_err, io_err.kind()))
            }
            tungstenite::Error::Http(response) => {
                Self::Transport(format!("handshake rejected with HTTP {}", response.status()))
            }
            other => Self::Transport(other.to_string()),
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::ServerRejected(_))
    }
}

impl From<RejectReason> for ConnectionError {
    fn from(reason: RejectReason) -> Self {
        Self::ServerRejected(reason)
    }
}
