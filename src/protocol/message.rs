//! Protocol messages exchanged between peers.
//!
//! The core does not define a concrete wire syntax; an [`Envelope`] is the
//! abstract form of one protocol message, and the per-kind payloads of
//! descriptions, transports and security layers are carried as opaque
//! `serde_json::Value` bodies that the registered adapters interpret.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Action, Creator, PeerAddress, Reason, Senders};

/// One protocol message: an action applied to a session, optionally
/// scoped to one or more contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// The action this message performs.
    pub action: Action,
    /// Session the message belongs to.
    #[serde(rename = "sid")]
    pub session_id: String,
    /// Sending peer.
    pub from: PeerAddress,
    /// Receiving peer.
    pub to: PeerAddress,
    /// Session initiator, set on session-initiate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator: Option<PeerAddress>,
    /// Session responder, set on session-accept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responder: Option<PeerAddress>,
    /// Contents affected by the action.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<ContentElement>,
    /// Termination reason, set on session-terminate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Reason>,
}

/// Wire form of one content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentElement {
    /// Party that created the content.
    pub creator: Creator,
    /// Name, unique within the session.
    pub name: String,
    /// Senders policy; an omitted value means `both`.
    #[serde(default)]
    pub senders: Senders,
    /// Free-text disposition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<String>,
    /// Description of the negotiated payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<DescriptionElement>,
    /// Transport used to move the payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportElement>,
    /// Optional security layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityElement>,
}

/// Wire form of a description, keyed by namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionElement {
    /// Namespace identifying the description kind.
    pub namespace: String,
    /// Kind-specific payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

/// Wire form of a transport, keyed by namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportElement {
    /// Namespace identifying the transport kind.
    pub namespace: String,
    /// Reachability candidates, ordered by descending priority.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateElement>,
    /// Transport-specific sub-message, present on transport-info.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    /// Kind-specific payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

/// Wire form of a security layer, keyed by namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityElement {
    /// Namespace identifying the security kind.
    pub namespace: String,
    /// Kind-specific payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

/// Wire form of one transport candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateElement {
    /// Candidate identifier, unique within its transport.
    pub id: String,
    /// Preference, higher is better.
    pub priority: u32,
    /// Kind-specific payload (addresses, ports, ...).
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl Envelope {
    /// Create a message with no contents and no reason.
    pub fn new(action: Action, session_id: &str, from: PeerAddress, to: PeerAddress) -> Self {
        Self {
            action,
            session_id: session_id.to_string(),
            from,
            to,
            initiator: None,
            responder: None,
            contents: Vec::new(),
            reason: None,
        }
    }

    /// Attach a content element.
    pub fn with_content(mut self, content: ContentElement) -> Self {
        self.contents.push(content);
        self
    }

    /// Attach a termination reason.
    pub fn with_reason(mut self, reason: Reason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Create a session-initiate message.
    pub fn session_initiate(
        from: PeerAddress,
        to: PeerAddress,
        session_id: &str,
        contents: Vec<ContentElement>,
    ) -> Self {
        let mut envelope = Self::new(Action::SessionInitiate, session_id, from.clone(), to);
        envelope.initiator = Some(from);
        envelope.contents = contents;
        envelope
    }

    /// Create a session-accept message.
    pub fn session_accept(
        from: PeerAddress,
        to: PeerAddress,
        session_id: &str,
        contents: Vec<ContentElement>,
    ) -> Self {
        let mut envelope = Self::new(Action::SessionAccept, session_id, from.clone(), to);
        envelope.responder = Some(from);
        envelope.contents = contents;
        envelope
    }

    /// Create a session-terminate message carrying a reason.
    pub fn session_terminate(
        from: PeerAddress,
        to: PeerAddress,
        session_id: &str,
        reason: Reason,
    ) -> Self {
        Self::new(Action::SessionTerminate, session_id, from, to).with_reason(reason)
    }

    /// Create a session-info message.
    pub fn session_info(from: PeerAddress, to: PeerAddress, session_id: &str) -> Self {
        Self::new(Action::SessionInfo, session_id, from, to)
    }

    /// Create a content-add message proposing one content.
    pub fn content_add(
        from: PeerAddress,
        to: PeerAddress,
        session_id: &str,
        content: ContentElement,
    ) -> Self {
        Self::new(Action::ContentAdd, session_id, from, to).with_content(content)
    }

    /// Create a content-accept message.
    pub fn content_accept(
        from: PeerAddress,
        to: PeerAddress,
        session_id: &str,
        content: ContentElement,
    ) -> Self {
        Self::new(Action::ContentAccept, session_id, from, to).with_content(content)
    }

    /// Create a content-reject message.
    pub fn content_reject(
        from: PeerAddress,
        to: PeerAddress,
        session_id: &str,
        content: ContentElement,
    ) -> Self {
        Self::new(Action::ContentReject, session_id, from, to).with_content(content)
    }

    /// Create a transport-replace message proposing a new transport for the
    /// named content.
    pub fn transport_replace(
        from: PeerAddress,
        to: PeerAddress,
        session_id: &str,
        creator: Creator,
        content_name: &str,
        transport: TransportElement,
    ) -> Self {
        Self::new(Action::TransportReplace, session_id, from, to)
            .with_content(ContentElement::stub(creator, content_name).with_transport(transport))
    }

    /// Create a transport-accept message for the named content.
    pub fn transport_accept(
        from: PeerAddress,
        to: PeerAddress,
        session_id: &str,
        creator: Creator,
        content_name: &str,
        transport: TransportElement,
    ) -> Self {
        Self::new(Action::TransportAccept, session_id, from, to)
            .with_content(ContentElement::stub(creator, content_name).with_transport(transport))
    }

    /// Create a transport-reject message echoing the refused transport.
    pub fn transport_reject(
        from: PeerAddress,
        to: PeerAddress,
        session_id: &str,
        creator: Creator,
        content_name: &str,
        transport: TransportElement,
    ) -> Self {
        Self::new(Action::TransportReject, session_id, from, to)
            .with_content(ContentElement::stub(creator, content_name).with_transport(transport))
    }

    /// Create a transport-info message for the named content.
    pub fn transport_info(
        from: PeerAddress,
        to: PeerAddress,
        session_id: &str,
        creator: Creator,
        content_name: &str,
        namespace: &str,
        info: Value,
    ) -> Self {
        let transport = TransportElement {
            namespace: namespace.to_string(),
            candidates: Vec::new(),
            info: Some(info),
            payload: Value::Null,
        };
        Self::new(Action::TransportInfo, session_id, from, to)
            .with_content(ContentElement::stub(creator, content_name).with_transport(transport))
    }

    /// The message's single content, if it has exactly one.
    pub fn sole_content(&self) -> Option<&ContentElement> {
        if self.contents.len() == 1 {
            self.contents.first()
        } else {
            None
        }
    }

    /// The content element with the given name, if present.
    pub fn content_named(&self, name: &str) -> Option<&ContentElement> {
        self.contents.iter().find(|c| c.name == name)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl ContentElement {
    /// A minimal element naming an existing content, used by actions that
    /// address a content without re-describing it.
    pub fn stub(creator: Creator, name: &str) -> Self {
        Self {
            creator,
            name: name.to_string(),
            senders: Senders::default(),
            disposition: None,
            description: None,
            transport: None,
            security: None,
        }
    }

    /// Attach a transport element.
    pub fn with_transport(mut self, transport: TransportElement) -> Self {
        self.transport = Some(transport);
        self
    }
}

impl TransportElement {
    /// Create an element with no candidates and no payload.
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            candidates: Vec::new(),
            info: None,
            payload: Value::Null,
        }
    }
}
