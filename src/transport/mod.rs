//! Transport layer abstraction.
//!
//! A [`Transport`] is the mechanism a content uses to bring up its
//! out-of-band byte stream, together with the transport's reachability
//! candidates. Concrete kinds are resolved by namespace; the core only
//! drives the contract below.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                Content                   │
//! │        (transport-kind agnostic)        │
//! └──────────────────┬──────────────────────┘
//!                    │
//!          ┌─────────┴────────┐
//!          ▼                  ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │  candidate kind │ │  in-band kind   │
//! │ (direct sockets)│ │ (tunnelled)     │
//! └─────────────────┘ └─────────────────┘
//! ```
//!
//! Establishment is asynchronous and must report its outcome through the
//! [`TransportCallback`] exactly once: success once, or failure once, never
//! both and never neither. A failure feeds the content's replacement logic
//! (blacklist the namespace, propose the next best transport kind).

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::connection::Bytestream;
use crate::endpoint::Endpoint;
use crate::error::AccordError;
use crate::protocol::{CandidateElement, Content, Envelope, Reply, Session, TransportElement};
use crate::registry::Namespaced;

/// One reachability option offered by a transport.
///
/// Candidates are compared with [`matches`](TransportCandidate::matches) for
/// idempotent insertion: re-offering a known candidate must not grow the
/// candidate list.
pub trait TransportCandidate: Send + Sync {
    /// Preference of this candidate, higher is better.
    fn priority(&self) -> u32;

    /// Wire representation.
    fn element(&self) -> CandidateElement;

    /// Whether `other` denotes the same reachability option.
    fn matches(&self, other: &dyn TransportCandidate) -> bool;

    /// Attach the owning transport.
    fn set_transport(&self, transport: Weak<dyn Transport>);

    /// The owning transport, if still alive.
    fn transport(&self) -> Option<Arc<dyn Transport>>;
}

/// Back-reference from a candidate to its owning transport.
///
/// Embed this in concrete candidate kinds to satisfy the parent-link part of
/// the [`TransportCandidate`] contract.
#[derive(Default)]
pub struct TransportLink(Mutex<Option<Weak<dyn Transport>>>);

impl TransportLink {
    /// Create an unattached link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the link at a transport.
    pub fn set(&self, transport: Weak<dyn Transport>) {
        *self.0.lock() = Some(transport);
    }

    /// The linked transport, if set and still alive.
    pub fn get(&self) -> Option<Arc<dyn Transport>> {
        self.0.lock().as_ref().and_then(Weak::upgrade)
    }
}

/// Ordered candidate list, sorted by non-increasing priority.
///
/// Insertion keeps the order invariant and deduplicates by candidate
/// equality; among equal priorities, discovery order is preserved.
#[derive(Default)]
pub struct CandidateQueue {
    entries: Mutex<Vec<Arc<dyn TransportCandidate>>>,
}

impl CandidateQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate at its priority position.
    ///
    /// Returns `false` when an equal candidate was already present; the
    /// queue is unchanged in that case.
    pub fn insert(&self, candidate: Arc<dyn TransportCandidate>) -> bool {
        let mut entries = self.entries.lock();
        if entries.iter().any(|e| e.matches(candidate.as_ref())) {
            return false;
        }
        let at = entries
            .iter()
            .position(|e| e.priority() < candidate.priority())
            .unwrap_or(entries.len());
        entries.insert(at, candidate);
        true
    }

    /// Snapshot of the candidates, best first.
    pub fn snapshot(&self) -> Vec<Arc<dyn TransportCandidate>> {
        self.entries.lock().clone()
    }

    /// Wire representations of the candidates, best first.
    pub fn elements(&self) -> Vec<CandidateElement> {
        self.entries.lock().iter().map(|c| c.element()).collect()
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// A transport kind: establishes the byte stream a content negotiates.
///
/// Implementations keep two candidate queues (ours and the peer's) and
/// handle their kind's wire sub-messages. All establishment methods run on
/// spawned tasks, never on the request-dispatch path.
#[async_trait]
pub trait Transport: Namespaced + Send + Sync {
    /// Wire representation, including our current candidates.
    fn element(&self) -> TransportElement;

    /// Candidates we offer to the peer.
    fn our_candidates(&self) -> &CandidateQueue;

    /// Candidates the peer offered to us.
    fn their_candidates(&self) -> &CandidateQueue;

    /// Attach the owning content.
    fn set_content(&self, content: Weak<Content>);

    /// The owning content, if still alive.
    fn content(&self) -> Option<Arc<Content>>;

    /// Perform any setup needed before establishment (e.g. resolve local
    /// candidates). The default does nothing.
    async fn prepare(&self, endpoint: &Arc<Endpoint>) {
        let _ = endpoint;
    }

    /// Bring up the byte stream with the local peer as receiver.
    ///
    /// Reports the outcome through `callback` exactly once.
    async fn establish_incoming(
        &self,
        endpoint: Arc<Endpoint>,
        callback: Arc<dyn TransportCallback>,
        session: Arc<Session>,
    );

    /// Bring up the byte stream with the local peer as sender.
    ///
    /// Reports the outcome through `callback` exactly once.
    async fn establish_outgoing(
        &self,
        endpoint: Arc<Endpoint>,
        callback: Arc<dyn TransportCallback>,
        session: Arc<Session>,
    );

    /// Process a transport-specific sub-message and produce the reply.
    ///
    /// Malformed info must be answered with a protocol-error reply, never a
    /// panic. The default refuses all sub-messages.
    fn handle_transport_info(&self, info: &Value, envelope: &Envelope) -> Reply {
        let _ = (info, envelope);
        Reply::Error(crate::protocol::ErrorCondition::FeatureNotImplemented)
    }

    /// Reconcile peer-supplied transport parameters from a session-accept.
    /// The default does nothing.
    async fn handle_session_accept(&self, element: &TransportElement, endpoint: &Arc<Endpoint>) {
        let _ = (element, endpoint);
    }

    /// Release transport-specific resources. Idempotent; the default does
    /// nothing.
    fn cleanup(&self) {}
}

/// Candidate-insertion helpers on transport trait objects.
///
/// Insertion wires the candidate's parent link to the transport, which needs
/// the owning `Arc`; hence an extension trait rather than trait methods.
pub trait TransportExt {
    /// Insert into the local candidate queue and set the candidate's parent.
    fn add_our_candidate(&self, candidate: Arc<dyn TransportCandidate>) -> bool;

    /// Insert into the peer candidate queue and set the candidate's parent.
    fn add_their_candidate(&self, candidate: Arc<dyn TransportCandidate>) -> bool;
}

impl TransportExt for Arc<dyn Transport> {
    fn add_our_candidate(&self, candidate: Arc<dyn TransportCandidate>) -> bool {
        candidate.set_transport(Arc::downgrade(self));
        self.our_candidates().insert(candidate)
    }

    fn add_their_candidate(&self, candidate: Arc<dyn TransportCandidate>) -> bool {
        candidate.set_transport(Arc::downgrade(self));
        self.their_candidates().insert(candidate)
    }
}

/// Outcome callbacks for byte-stream establishment.
#[async_trait]
pub trait TransportCallback: Send + Sync {
    /// The byte stream is up.
    async fn on_transport_ready(&self, stream: Box<dyn Bytestream>);

    /// Establishment failed; the content will attempt a fallback.
    async fn on_transport_failed(&self, error: AccordError);
}

/// Factory for one transport kind.
///
/// Managers produce fresh [`Transport`] instances for either negotiation
/// role and advertise a priority used when picking the best remaining kind
/// after a failure.
pub trait TransportManager: Namespaced + Send + Sync {
    /// Preference of this kind among registered managers, higher is better.
    fn priority(&self) -> u32;

    /// Create a transport to offer from the proposing side.
    fn create_for_initiator(&self, content: &Arc<Content>) -> Arc<dyn Transport>;

    /// Create a transport answering a peer's offer.
    fn create_for_responder(
        &self,
        content: &Arc<Content>,
        offer: &TransportElement,
    ) -> Arc<dyn Transport>;
}

/// Factory reconstructing a [`Transport`] from its wire form.
pub trait TransportAdapter: Namespaced + Send + Sync {
    /// Build the transport described by `element`.
    fn from_element(&self, element: &TransportElement) -> crate::error::Result<Arc<dyn Transport>>;
}
