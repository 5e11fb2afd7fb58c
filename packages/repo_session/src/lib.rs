//! Repo Session - single-connection chat session library
//!
//! This crate owns the lifecycle of one WebSocket connection to a backend that
//! has ingested a remote code repository. It has no UI and no knowledge of how
//! replies are rendered; presentation code reads the observable snapshot and
//! the inbound frame stream.
//!
//! # Example
//!
//! ```no_run
//! use repo_session::{Frame, RepoTarget, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = Session::new(SessionConfig {
//!         base_endpoint: "ws://localhost:8000".to_string(),
//!         ..Default::default()
//!     });
//!
//!     let target: RepoTarget = "octo/hello-world".parse().unwrap();
//!     session.connect(target).await.unwrap();
//!
//!     // Wait for the backend to finish analysing the repository
//!     let mut state = session.subscribe();
//!     state.wait_for(|s| !s.is_processing()).await.unwrap();
//!
//!     let mut frames = session.frames();
//!     session.send("What is the entry point?");
//!     while let Ok(frame) = frames.recv().await {
//!         if let Frame::Payload(text) = frame {
//!             println!("{}", text);
//!             break;
//!         }
//!     }
//!
//!     session.disconnect();
//! }
//! ```

mod error;
pub mod frame;
pub mod keepalive;
mod manager;
mod session;
pub mod target;

#[cfg(test)]
mod test_helpers;

pub use error::ConnectionError;
pub use frame::{ControlTag, Frame, OutboundFrame, RejectReason, classify};
pub use keepalive::KeepAliveScheduler;
pub use manager::{ConnectionManager, OpenPhase, SessionConfig, SessionSnapshot, SessionState};
pub use session::Session;
pub use target::{ClientId, RepoTarget, endpoint_url};
