//! # Accord Protocol - Peer-to-Peer Session Negotiation
//!
//! Negotiation core for establishing out-of-band byte-stream sessions
//! between two peers: media descriptions, pluggable transports with
//! automatic fallback, and optional security layers.
//!
//! ## Features
//!
//! - **Session negotiation**: initiate/accept/terminate dialogue with a
//!   monotonic session state machine
//! - **Named contents**: each session negotiates one or more contents, each
//!   binding a description, a transport and optional security
//! - **Transport fallback**: failed or rejected transport kinds are
//!   blacklisted and replaced with the next best kind, with tie-breaking
//!   when both peers propose at once
//! - **Pluggable kinds**: descriptions, transports and security layers are
//!   resolved from namespace registries; the core never depends on a
//!   concrete kind
//! - **Reactive core**: request handlers acknowledge synchronously while
//!   establishment, wrapping and follow-up signalling run on spawned tasks
//!
//! ## Protocol Overview
//!
//! ```text
//! Initiator                           Responder
//!    |                                   |
//!    |------ session-initiate ---------->|  Propose contents
//!    |<------ session-accept ------------|  Agreement; transports start
//!    |                                   |
//!    |<===== byte stream (per content) ==>|
//!    |                                   |
//!    |------ transport-replace --------->|  Fallback on failure
//!    |<-- transport-accept / -reject ----|
//!    |                                   |
//!    |------ session-terminate --------->|  Explicit end, with reason
//! ```
//!
//! ### Session State Machine
//!
//! ```text
//!                  send_initiate() / inbound initiate
//!     [Fresh] ─────────────────────────> [Pending]
//!                                            │
//!                     session-accept         │
//!         ┌──────────────────────────────────┤
//!         v                                  v
//!     [Active] ──────> [Ended]          [Cancelled]
//! ```
//!
//! A session that cannot proceed — unsupported description, no usable
//! transport, security mismatch — always ends with an explicit
//! session-terminate carrying a machine-readable reason, never by silently
//! going idle.
//!
//! ## Quick Start
//!
//! ### Initiating a session
//!
//! ```rust,ignore
//! use accord::{Content, Creator, Endpoint, Senders, Session};
//!
//! let endpoint = Endpoint::new(connection);
//! endpoint.transport_managers.register(my_transport_manager);
//!
//! let session = Session::initiate(&endpoint, "peer@example".into()).await;
//! let content = Content::with_parts(
//!     Some(description),
//!     Some(transport),
//!     None,
//!     "files",
//!     None,
//!     Creator::Initiator,
//!     Senders::Initiator,
//! );
//! session.add_content(content);
//! session.send_initiate().await?;
//! ```
//!
//! ### Responding
//!
//! ```rust,ignore
//! use accord::{DescriptionHandler, Endpoint};
//!
//! // Handlers registered by description namespace observe inbound
//! // proposals; inbound messages are routed via the endpoint.
//! endpoint.description_handlers.register(my_handler);
//! let reply = endpoint.handle_envelope(inbound).await;
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: sessions, contents, actions and message envelopes
//! - [`transport`]: transport trait, candidates and fallback managers
//! - [`security`]: optional byte-stream security wrapping
//! - [`description`]: payload descriptions and application handlers
//! - [`connection`]: the send contract the host must provide
//! - [`endpoint`]: the local protocol stack and session registry
//! - [`registry`]: namespace registries
//! - [`config`]: configuration management
//! - [`error`]: error types and result alias

pub mod config;
pub mod connection;
pub mod description;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod security;
pub mod transport;

// Re-exports for convenience
pub use config::EndpointConfig;
pub use connection::{Bytestream, Connection};
pub use description::{Description, DescriptionAdapter, DescriptionHandler};
pub use endpoint::{Endpoint, SessionRegistry};
pub use error::{AccordError, Result};
pub use protocol::{
    Action, CandidateElement, Content, ContentElement, ContentLink, Creator, DescriptionElement,
    Envelope, ErrorCondition, PeerAddress, Reason, ReasonCode, Reply, Role, SecurityElement,
    Senders, Session, SessionListener, SessionState, TransportElement,
};
pub use registry::{Namespaced, Registry, TransportManagerRegistry};
pub use security::{Security, SecurityAdapter, SecurityCallback};
pub use transport::{
    CandidateQueue, Transport, TransportAdapter, TransportCallback, TransportCandidate,
    TransportExt, TransportLink, TransportManager,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
