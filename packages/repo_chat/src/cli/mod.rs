pub mod chat;
pub mod check;
pub mod notice;

#[cfg(test)]
mod test_backend;

use anyhow::{Context, Result, bail};
use repo_session::{RepoTarget, Session, SessionSnapshot, SessionState};
use tokio::io::BufReader;
use tracing::{debug, info};

use crate::config::ChatConfig;
use chat::ChatEnd;
use check::Readiness;
use notice::Notice;

/// Interactive chat: connect, wait for analysis, then a prompt loop.
pub async fn chat_command(config: &ChatConfig, target: &str) -> Result<()> {
    let target: RepoTarget = target.parse()?;
    let session = Session::new(config.session.clone());
    let frames = session.frames();

    connect(&session, &target).await?;
    eprintln!("[repochat: connected, analyzing {target}. Type /quit to leave]");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let end = chat::run(&session, frames, stdin, &mut stdout).await?;
    session.disconnect();

    match end {
        ChatEnd::Quit => Ok(()),
        ChatEnd::Closed(notice) => match notice.card() {
            Some(card) => bail!("session with {target} ended: {}", card.title),
            None => Ok(()),
        },
    }
}

/// Connect and wait until the repository is processed or refused.
pub async fn check_command(config: &ChatConfig, target: &str) -> Result<()> {
    let target: RepoTarget = target.parse()?;
    let session = Session::new(config.session.clone());
    let mut frames = session.frames();

    connect(&session, &target).await?;
    eprintln!("[repochat: connected, analyzing {target}]");

    let readiness = check::await_ready(&session, &mut frames).await?;
    session.disconnect();

    match readiness {
        Readiness::Ready => {
            println!("{target} is ready");
            Ok(())
        }
        Readiness::Failed(notice) => {
            eprintln!("{}", notice.render());
            let title = notice.card().map(|c| c.title).unwrap_or("Unavailable");
            bail!("{target} is not available: {title}")
        }
    }
}

/// Print the resolved configuration.
pub fn config_command(config: &ChatConfig) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

async fn connect(session: &Session, target: &RepoTarget) -> Result<()> {
    info!(%target, endpoint = %session.config().base_endpoint, "Connecting");
    if let Err(err) = session.connect(target.clone()).await {
        eprintln!("{}", Notice::from_error(&err).render());
        return Err(err).with_context(|| format!("Failed to connect to {target}"));
    }
    debug!(client_id = ?session.client_id(), "Connected");
    Ok(())
}

/// Notice for a session that left `Open` without a frame explaining why.
fn closed_notice(snapshot: &SessionSnapshot) -> Notice {
    if let Some(err) = snapshot.rejection() {
        return Notice::from_error(&err);
    }
    match snapshot.state {
        SessionState::Idle => Notice::ConnectionFailed("session disconnected".to_string()),
        _ => Notice::ConnectionFailed("connection closed by the server".to_string()),
    }
}
