use anyhow::{Context, Result};
use repo_session::{Frame, OpenPhase, Session, SessionState};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::closed_notice;
use super::notice::{Conversation, Notice};

#[derive(Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Failed(Notice),
}

/// Wait until the backend finishes analysing the repository, refuses it, or
/// the connection goes away. `frames` must have been subscribed before
/// `connect` so the early control frames are not missed.
pub async fn await_ready(
    session: &Session,
    frames: &mut broadcast::Receiver<Frame>,
) -> Result<Readiness> {
    let mut state = session.subscribe();
    let mut convo = Conversation::default();

    loop {
        let snapshot = state.borrow_and_update().clone();
        match snapshot.state {
            SessionState::Open(OpenPhase::Ready) => return Ok(Readiness::Ready),
            SessionState::Connecting | SessionState::Open(OpenPhase::Processing) => {}
            SessionState::Idle | SessionState::Closed => {
                return Ok(Readiness::Failed(closed_notice(&snapshot)));
            }
        }

        tokio::select! {
            changed = state.changed() => changed.context("session dropped while waiting")?,
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    debug!(frame = frame.wire_text(), "Frame while processing");
                    if let Some(notice) = convo.on_frame(&frame).filter(Notice::is_terminal) {
                        return Ok(Readiness::Failed(notice));
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Frame stream lagged"),
                Err(RecvError::Closed) => {
                    return Ok(Readiness::Failed(closed_notice(&session.snapshot())));
                }
            },
        }
    }
}
