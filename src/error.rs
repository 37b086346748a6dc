//! Accord error types.
//!
//! Failures fall into three tiers with different carriers:
//!
//! - **Recoverable protocol errors** are answered to the peer as
//!   [`Reply::Error`](crate::protocol::Reply) values (tie-break,
//!   out-of-order, feature-not-implemented) and never touch local state.
//! - **Operational failures** — connection-layer send failures, transport
//!   establishment failures, security failures — are [`AccordError`] results.
//!   They are logged at the boundary of each asynchronous task and, where
//!   recovery is possible (transport replacement), recovered automatically.
//! - **Invariant violations** (an impossible state-machine configuration,
//!   e.g. a second transport replacement while one is pending) panic: they
//!   indicate a programming or contract error that validation should have
//!   made unreachable, and must not be swallowed.

use thiserror::Error;

use crate::protocol::ErrorCondition;

/// Accord Protocol errors.
#[derive(Error, Debug)]
pub enum AccordError {
    /// Protocol-level error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid message format.
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// Operation attempted in the wrong session state.
    #[error("Illegal session state: {0}")]
    IllegalState(String),

    /// No adapter registered for a namespace.
    #[error("Unsupported {kind} namespace: {namespace}")]
    Unsupported {
        /// Which element kind lacked an adapter.
        kind: &'static str,
        /// The unrecognized namespace.
        namespace: String,
    },

    /// The peer answered a request with a protocol error.
    #[error("Peer replied with error: {0:?}")]
    ErrorReply(ErrorCondition),

    /// Byte-stream establishment failed.
    #[error("Transport failed: {0}")]
    TransportFailed(String),

    /// Security layer setup failed.
    #[error("Security failed: {0}")]
    SecurityFailed(String),

    /// Connection-layer communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// The connection layer gave up waiting for a reply.
    #[error("Request timed out")]
    Timeout,

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Accord operations
pub type Result<T> = std::result::Result<T, AccordError>;

impl From<toml::de::Error> for AccordError {
    fn from(err: toml::de::Error) -> Self {
        AccordError::Config(err.to_string())
    }
}
