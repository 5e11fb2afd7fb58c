//! Wire frames and the inbound frame classifier.
//!
//! The protocol is plain text. Four exact strings carry protocol meaning,
//! everything else is conversational payload.

use std::fmt;

/// Sent by the backend once the repository has been ingested.
pub const REPO_PROCESSED: &str = "repo_processed";

/// Literal token sent on the keepalive interval.
pub const KEEPALIVE_TOKEN: &str = "ping";

const REPO_TOO_LARGE: &str = "error:repo_too_large";
const REPO_NOT_FOUND: &str = "error:repo_not_found";
const REPO_PRIVATE: &str = "error:repo_private";

/// Why the backend refused to serve a repository. Always terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectReason {
    TooLarge,
    NotFound,
    Private,
}

impl RejectReason {
    /// The exact frame text the backend sends for this rejection.
    pub fn wire_tag(self) -> &'static str {
        match self {
            RejectReason::TooLarge => REPO_TOO_LARGE,
            RejectReason::NotFound => REPO_NOT_FOUND,
            RejectReason::Private => REPO_PRIVATE,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooLarge => write!(f, "repository too large"),
            RejectReason::NotFound => write!(f, "repository not found"),
            RejectReason::Private => write!(f, "repository is private"),
        }
    }
}

/// A frame whose exact text has protocol-level meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlTag {
    ProcessedOk,
    Rejected(RejectReason),
}

/// An inbound frame after classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Control(ControlTag),
    Payload(String),
}

impl Frame {
    /// The text this frame arrived as.
    pub fn wire_text(&self) -> &str {
        match self {
            Frame::Control(ControlTag::ProcessedOk) => REPO_PROCESSED,
            Frame::Control(ControlTag::Rejected(reason)) => reason.wire_tag(),
            Frame::Payload(text) => text,
        }
    }

    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            Frame::Control(ControlTag::Rejected(reason)) => Some(*reason),
            _ => None,
        }
    }
}

/// Frames the client puts on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Free-text chat message
    Text(String),
    /// Liveness traffic, no reply expected
    KeepAlive,
}

impl OutboundFrame {
    pub fn into_text(self) -> String {
        match self {
            OutboundFrame::Text(text) => text,
            OutboundFrame::KeepAlive => KEEPALIVE_TOKEN.to_string(),
        }
    }
}

/// Classify a raw inbound text frame.
///
/// Matching is exact. Notably a frame starting with `All API keys` is plain
/// payload here; recognising it as a service notice is left to whoever
/// renders replies.
pub fn classify(raw: &str) -> Frame {
    match raw {
        REPO_PROCESSED => Frame::Control(ControlTag::ProcessedOk),
        REPO_TOO_LARGE => Frame::Control(ControlTag::Rejected(RejectReason::TooLarge)),
        REPO_NOT_FOUND => Frame::Control(ControlTag::Rejected(RejectReason::NotFound)),
        REPO_PRIVATE => Frame::Control(ControlTag::Rejected(RejectReason::Private)),
        other => Frame::Payload(other.to_string()),
    }
}
