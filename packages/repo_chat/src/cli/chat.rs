use anyhow::{Context, Result};
use repo_session::{Frame, Session, SessionState};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use super::closed_notice;
use super::notice::{Conversation, Notice, Submit};

const PROMPT: &str = "> ";
const QUIT: &str = "/quit";

/// How a chat loop ended.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatEnd {
    /// `/quit`, end of input or Ctrl-C
    Quit,
    /// The session ended on its own; the notice says why
    Closed(Notice),
}

/// Drive one conversation until the user leaves or the session ends.
///
/// Lines from `input` are sent only while the repository is ready and no
/// reply is outstanding. At end of input the loop waits for an outstanding
/// reply before returning, so piped questions still get their answer.
pub async fn run<R, W>(
    session: &Session,
    mut frames: broadcast::Receiver<Frame>,
    input: R,
    out: &mut W,
) -> Result<ChatEnd>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut convo = Conversation::default();
    let mut state = session.subscribe();
    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    let Some(notice) = convo.on_frame(&frame) else {
                        continue;
                    };
                    writeln!(out, "{}", notice.render())?;
                    if notice.is_terminal() {
                        return Ok(ChatEnd::Closed(notice));
                    }
                    if !input_open && !convo.is_waiting() {
                        return Ok(ChatEnd::Quit);
                    }
                    prompt(out)?;
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Frame stream lagged"),
                Err(RecvError::Closed) => return Ok(ChatEnd::Quit),
            },

            changed = state.changed() => {
                changed.context("session dropped during chat")?;
                let snapshot = state.borrow_and_update().clone();
                if snapshot.state == SessionState::Closed {
                    // The closing frame may still be queued behind this update
                    let notice = closed_notice(&snapshot);
                    writeln!(out, "{}", notice.render())?;
                    return Ok(ChatEnd::Closed(notice));
                }
            },

            line = lines.next_line(), if input_open => {
                let Some(line) = line.context("Failed to read input")? else {
                    debug!("End of input");
                    input_open = false;
                    if !convo.is_waiting() {
                        return Ok(ChatEnd::Quit);
                    }
                    continue;
                };
                if line.trim() == QUIT {
                    return Ok(ChatEnd::Quit);
                }
                match convo.submit(&session.snapshot(), &line) {
                    Submit::Send(text) => session.send(text),
                    Submit::Empty => prompt(out)?,
                    Submit::Busy => {
                        let why = if convo.is_waiting() {
                            "still waiting for the last reply"
                        } else {
                            "the repository is still being analyzed"
                        };
                        writeln!(out, "[repochat: {why}, message not sent]")?;
                    }
                }
            },

            _ = tokio::signal::ctrl_c() => return Ok(ChatEnd::Quit),
        }
    }
}

fn prompt<W: Write>(out: &mut W) -> Result<()> {
    write!(out, "{PROMPT}")?;
    out.flush()?;
    Ok(())
}
