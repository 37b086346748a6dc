//! Accord Protocol negotiation and session management.
//!
//! Implements the Accord session-establishment dialogue between two peers:
//! a session is proposed with one or more named *contents* (each pairing a
//! description of the payload with a transport and optional security layer),
//! the peers accept or modify it, and once agreement is reached an
//! out-of-band byte stream is brought up per content.
//!
//! # Protocol Overview
//!
//! ## Message Flow
//!
//! ```text
//! Initiator                           Responder
//!    |                                   |
//!    |------ session-initiate ---------->|  Propose contents
//!    |<------------- ack ----------------|
//!    |                                   |
//!    |<------ session-accept ------------|  Contents agreed, both
//!    |-------------- ack --------------->|  sides start transports
//!    |                                   |
//!    |<==== byte stream (per content) ===>|
//!    |                                   |
//!    |------ transport-replace --------->|  Fallback on failure
//!    |<-- transport-accept / -reject ----|
//!    |                                   |
//!    |------ session-terminate --------->|  Explicit end, with reason
//! ```
//!
//! ## Session State Machine
//!
//! | State       | Description                      | Valid Transitions      |
//! |-------------|----------------------------------|------------------------|
//! | `Fresh`     | Prior to session-initiate        | → Pending              |
//! | `Pending`   | Prior to session-accept          | → Active, Cancelled    |
//! | `Active`    | Post session-accept              | → Ended, Cancelled     |
//! | `Cancelled` | Terminated by cancellation       | (terminal)             |
//! | `Ended`     | Terminated successfully          | (terminal)             |
//!
//! ## Actions
//!
//! Every protocol message carries exactly one action. Session-level actions
//! are handled by the [`Session`] itself; the remaining actions address
//! exactly one content and are delegated to it.
//!
//! | Session-level       | Content-scoped      |
//! |---------------------|---------------------|
//! | `session-initiate`  | `content-modify`    |
//! | `session-accept`    | `description-info`  |
//! | `session-terminate` | `security-info`     |
//! | `content-accept`    | `session-info`      |
//! | `content-add`       | `transport-accept`  |
//! | `content-reject`    | `transport-info`    |
//! | `content-remove`    | `transport-reject`  |
//! |                     | `transport-replace` |

mod content;
mod message;
mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use content::{Content, ContentLink};
pub use message::{
    CandidateElement, ContentElement, DescriptionElement, Envelope, SecurityElement,
    TransportElement,
};
pub use session::{Session, SessionListener, SessionState};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of auto-generated content names.
pub const CONTENT_NAME_PREFIX: &str = "cont-";

/// The action carried by a protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Accept a proposed content.
    ContentAccept,
    /// Propose an additional content for an existing session.
    ContentAdd,
    /// Modify the senders policy of a content.
    ContentModify,
    /// Reject a proposed content.
    ContentReject,
    /// Remove a content from the session.
    ContentRemove,
    /// Description-specific sub-message.
    DescriptionInfo,
    /// Security-specific sub-message.
    SecurityInfo,
    /// Accept a proposed session.
    SessionAccept,
    /// Session-level informational message.
    SessionInfo,
    /// Propose a new session.
    SessionInitiate,
    /// End a session, carrying a reason.
    SessionTerminate,
    /// Accept a proposed replacement transport.
    TransportAccept,
    /// Transport-specific sub-message (e.g. candidate exchange).
    TransportInfo,
    /// Reject a proposed replacement transport.
    TransportReject,
    /// Propose replacing a content's transport.
    TransportReplace,
}

impl Action {
    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContentAccept => "content-accept",
            Self::ContentAdd => "content-add",
            Self::ContentModify => "content-modify",
            Self::ContentReject => "content-reject",
            Self::ContentRemove => "content-remove",
            Self::DescriptionInfo => "description-info",
            Self::SecurityInfo => "security-info",
            Self::SessionAccept => "session-accept",
            Self::SessionInfo => "session-info",
            Self::SessionInitiate => "session-initiate",
            Self::SessionTerminate => "session-terminate",
            Self::TransportAccept => "transport-accept",
            Self::TransportInfo => "transport-info",
            Self::TransportReject => "transport-reject",
            Self::TransportReplace => "transport-replace",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The role a peer plays within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The peer that proposed the session.
    Initiator,
    /// The peer the session was proposed to.
    Responder,
}

/// Which party created a content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Creator {
    /// Content created by the session initiator.
    Initiator,
    /// Content created by the session responder.
    Responder,
}

/// Which party/parties send data for a content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Senders {
    /// Neither party sends.
    None,
    /// Only the initiator sends.
    Initiator,
    /// Only the responder sends.
    Responder,
    /// Both parties send.
    #[default]
    Both,
}

/// Address of a peer, as understood by the underlying connection layer.
///
/// The core treats addresses as opaque routing tokens; the connection
/// implementation gives them meaning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(String);

impl PeerAddress {
    /// Create an address from its string form.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The string form of the address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

impl From<String> for PeerAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Machine-readable reason for ending a session.
///
/// The core itself produces `Success`, `Cancel`, `FailedTransport`,
/// `SecurityError` and `UnsupportedApplications`; the remaining codes are
/// part of the protocol vocabulary and may be produced by applications or
/// received from peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    /// An alternative session supersedes this one.
    AlternativeSession,
    /// The peer is busy.
    Busy,
    /// The session was cancelled.
    Cancel,
    /// The connection layer failed.
    ConnectivityError,
    /// The peer declined the session.
    Decline,
    /// The proposal expired before it was accepted.
    Expired,
    /// The application payload could not be processed.
    FailedApplication,
    /// No usable transport remains.
    FailedTransport,
    /// Unspecified error.
    GeneralError,
    /// The peer is no longer available.
    Gone,
    /// Offered parameters cannot be reconciled.
    IncompatibleParameters,
    /// The payload stream failed.
    MediaError,
    /// Required security layer is missing or failed.
    SecurityError,
    /// The session concluded successfully.
    Success,
    /// The peer did not respond in time.
    Timeout,
    /// No handler supports the offered description.
    UnsupportedApplications,
    /// No support for any offered transport.
    UnsupportedTransports,
}

/// Reason element attached to a session-terminate message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    /// Machine-readable reason code.
    pub code: ReasonCode,
    /// Optional human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Superseding session id, for `AlternativeSession`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_session: Option<String>,
}

impl Reason {
    /// Create a reason from a bare code.
    pub fn new(code: ReasonCode) -> Self {
        Self {
            code,
            text: None,
            alternative_session: None,
        }
    }

    /// Attach a human-readable explanation.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Protocol-level answer to a handled request.
///
/// Recoverable protocol errors travel as `Error` replies; they never corrupt
/// local state. Anything the peer must treat as fatal is expressed as a
/// `session-terminate` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// The request was accepted.
    Ack,
    /// The request was answered with a protocol error.
    Error(ErrorCondition),
}

impl Reply {
    /// Whether this reply is an acknowledgement.
    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }
}

/// Error condition of a protocol error reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCondition {
    /// The request was structurally malformed.
    BadRequest,
    /// The addressed handler does not implement this action.
    FeatureNotImplemented,
    /// No session/entity matches the request.
    ItemNotFound,
    /// The request is valid but arrived outside its sub-dialogue.
    OutOfOrder,
    /// Both peers proposed the same change; this proposal lost.
    TieBreak,
}

/// Generate a unique content name.
pub(crate) fn random_content_name() -> String {
    format!("{}{}", CONTENT_NAME_PREFIX, uuid::Uuid::new_v4().simple())
}
