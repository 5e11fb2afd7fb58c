//! What the terminal shows for session events.
//!
//! The session library classifies wire frames; this module decides how they
//! read to a person. The service-exhausted notice is recognised here only, by
//! its text prefix, and travels through the library as an ordinary payload.

use repo_session::{ConnectionError, ControlTag, Frame, RejectReason, SessionSnapshot};

/// Replies starting with this mean the backend has run out of model capacity.
pub const SERVICE_EXHAUSTED_PREFIX: &str = "All API keys";

pub const WELCOME: &str = "Hello! I've analyzed this repository. What would you like to know?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Shown once per session, when the repository has been processed
    Welcome,
    Reply(String),
    ServiceExhausted(String),
    Rejected(RejectReason),
    ConnectionFailed(String),
}

/// Title, explanation and retry advice for a failure notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCard {
    pub title: &'static str,
    pub body: &'static str,
    pub retry_worthwhile: bool,
}

impl Notice {
    pub fn from_error(err: &ConnectionError) -> Self {
        match err {
            ConnectionError::ServerRejected(reason) => Notice::Rejected(*reason),
            other => Notice::ConnectionFailed(other.to_string()),
        }
    }

    /// Failure notices end the conversation.
    pub fn is_terminal(&self) -> bool {
        self.card().is_some()
    }

    pub fn card(&self) -> Option<FailureCard> {
        let card = match self {
            Notice::Welcome | Notice::Reply(_) => return None,
            Notice::Rejected(RejectReason::TooLarge) => FailureCard {
                title: "Repository Size Limit Exceeded",
                body: "This repository exceeds the current size limit. You can:\n\
                       \n  - use a smaller repository\
                       \n  - start with the main branch only\
                       \n  - check back later, larger repositories are being worked on",
                retry_worthwhile: true,
            },
            Notice::Rejected(RejectReason::NotFound) => FailureCard {
                title: "Repository Not Found",
                body: "The repository doesn't seem to exist. Possible causes:\n\
                       \n  - the repository URL is incorrect\
                       \n  - the repository has been deleted or moved\
                       \n  - a typo in the owner or repository name",
                retry_worthwhile: false,
            },
            Notice::Rejected(RejectReason::Private) => FailureCard {
                title: "Private Repository",
                body: "This looks like a private repository, and only public repositories \
                       are supported. You can:\n\
                       \n  - use a public repository instead\
                       \n  - make this repository public if you own it",
                retry_worthwhile: false,
            },
            Notice::ServiceExhausted(_) => FailureCard {
                title: "Service Temporarily Unavailable",
                body: "The backend is temporarily out of capacity. Try again in a few minutes.",
                retry_worthwhile: true,
            },
            Notice::ConnectionFailed(_) => FailureCard {
                title: "Connection Failed",
                body: "Unable to establish a connection to the backend. Possible causes:\n\
                       \n  - server connectivity issues\
                       \n  - a temporary service disruption",
                retry_worthwhile: true,
            },
        };
        Some(card)
    }

    /// Text to print for this notice.
    pub fn render(&self) -> String {
        match self {
            Notice::Welcome => WELCOME.to_string(),
            Notice::Reply(text) => text.clone(),
            _ => {
                let Some(card) = self.card() else {
                    return String::new();
                };
                let mut out = format!("{}\n\n{}", card.title, card.body);
                if let Notice::ConnectionFailed(detail) = self {
                    out.push_str(&format!("\n\n({detail})"));
                }
                out.push_str(if card.retry_worthwhile {
                    "\n\nTry again, or try another repository."
                } else {
                    "\n\nTry another repository."
                });
                out
            }
        }
    }
}

/// Result of offering a line of input to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submit {
    Send(String),
    Empty,
    /// Not connected, still processing, or a reply is outstanding
    Busy,
}

/// Caller-side view of one conversation: whether the welcome was shown and
/// whether a reply is still outstanding.
#[derive(Debug, Default)]
pub struct Conversation {
    welcomed: bool,
    waiting: bool,
}

impl Conversation {
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Map an inbound frame to what should be shown, if anything.
    pub fn on_frame(&mut self, frame: &Frame) -> Option<Notice> {
        match frame {
            Frame::Control(ControlTag::ProcessedOk) => {
                if self.welcomed {
                    return None;
                }
                self.welcomed = true;
                Some(Notice::Welcome)
            }
            Frame::Control(ControlTag::Rejected(reason)) => Some(Notice::Rejected(*reason)),
            Frame::Payload(text) => {
                self.waiting = false;
                if text.starts_with(SERVICE_EXHAUSTED_PREFIX) {
                    Some(Notice::ServiceExhausted(text.clone()))
                } else {
                    Some(Notice::Reply(text.clone()))
                }
            }
        }
    }

    pub fn can_send(&self, snapshot: &SessionSnapshot) -> bool {
        snapshot.is_connected() && !snapshot.is_processing() && !self.waiting
    }

    pub fn submit(&mut self, snapshot: &SessionSnapshot, line: &str) -> Submit {
        if line.trim().is_empty() {
            return Submit::Empty;
        }
        if !self.can_send(snapshot) {
            return Submit::Busy;
        }
        self.waiting = true;
        Submit::Send(line.to_string())
    }
}
