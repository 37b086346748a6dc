//! Shared stubs for unit tests: a no-op connection, a recording connection
//! and minimal transport/manager/listener kinds.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::{Bytestream, Connection};
use crate::endpoint::Endpoint;
use crate::error::{AccordError, Result};
use crate::protocol::{
    Content, ContentLink, Envelope, PeerAddress, Reason, Reply, Session, SessionListener,
    SessionState, TransportElement,
};
use crate::registry::Namespaced;
use crate::transport::{
    CandidateQueue, Transport, TransportCallback, TransportManager,
};

pub(crate) struct NullConnection {
    local: PeerAddress,
}

impl NullConnection {
    pub(crate) fn new(local: &str) -> Arc<Self> {
        Arc::new(Self { local: local.into() })
    }
}

#[async_trait]
impl Connection for NullConnection {
    fn local_address(&self) -> PeerAddress {
        self.local.clone()
    }

    async fn send(&self, _envelope: Envelope) -> Result<()> {
        Ok(())
    }

    async fn send_and_await_reply(&self, _envelope: Envelope, _timeout: Duration) -> Result<Reply> {
        Ok(Reply::Ack)
    }
}

/// Records every outbound envelope and answers with a configurable reply.
pub(crate) struct RecordingConnection {
    local: PeerAddress,
    sent: Mutex<Vec<Envelope>>,
    reply: Mutex<Reply>,
}

impl RecordingConnection {
    pub(crate) fn new(local: &str) -> Arc<Self> {
        Arc::new(Self {
            local: local.into(),
            sent: Mutex::new(Vec::new()),
            reply: Mutex::new(Reply::Ack),
        })
    }

    pub(crate) fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    #[allow(dead_code)]
    pub(crate) fn set_reply(&self, reply: Reply) {
        *self.reply.lock() = reply;
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn local_address(&self) -> PeerAddress {
        self.local.clone()
    }

    async fn send(&self, envelope: Envelope) -> Result<()> {
        self.sent.lock().push(envelope);
        Ok(())
    }

    async fn send_and_await_reply(&self, envelope: Envelope, _timeout: Duration) -> Result<Reply> {
        self.sent.lock().push(envelope);
        Ok(*self.reply.lock())
    }
}

pub(crate) fn test_endpoint(local: &str) -> Arc<Endpoint> {
    Endpoint::new(NullConnection::new(local))
}

pub(crate) fn recording_endpoint(local: &str) -> (Arc<Endpoint>, Arc<RecordingConnection>) {
    let connection = RecordingConnection::new(local);
    (Endpoint::new(connection.clone()), connection)
}

/// Transport stub: establishment either fails immediately or yields one half
/// of an in-memory duplex stream.
pub(crate) struct StubTransport {
    namespace: String,
    fail: AtomicBool,
    ours: CandidateQueue,
    theirs: CandidateQueue,
    content: ContentLink,
    pub(crate) established: Mutex<Vec<&'static str>>,
    pub(crate) accepted_offers: Mutex<Vec<TransportElement>>,
    pub(crate) cleanups: AtomicUsize,
}

impl StubTransport {
    pub(crate) fn working(namespace: &str) -> Arc<Self> {
        Self::build(namespace, false)
    }

    #[allow(dead_code)]
    pub(crate) fn failing(namespace: &str) -> Arc<Self> {
        Self::build(namespace, true)
    }

    fn build(namespace: &str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            fail: AtomicBool::new(fail),
            ours: CandidateQueue::new(),
            theirs: CandidateQueue::new(),
            content: ContentLink::new(),
            established: Mutex::new(Vec::new()),
            accepted_offers: Mutex::new(Vec::new()),
            cleanups: AtomicUsize::new(0),
        })
    }

    async fn establish(&self, direction: &'static str, callback: Arc<dyn TransportCallback>) {
        self.established.lock().push(direction);
        if self.fail.load(Ordering::SeqCst) {
            callback
                .on_transport_failed(AccordError::TransportFailed(
                    "stub establishment failure".to_string(),
                ))
                .await;
        } else {
            let (near, _far) = tokio::io::duplex(64);
            let stream: Box<dyn Bytestream> = Box::new(near);
            callback.on_transport_ready(stream).await;
        }
    }
}

impl Namespaced for StubTransport {
    fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl Transport for StubTransport {
    fn element(&self) -> TransportElement {
        let mut element = TransportElement::new(&self.namespace);
        element.candidates = self.ours.elements();
        element
    }

    fn our_candidates(&self) -> &CandidateQueue {
        &self.ours
    }

    fn their_candidates(&self) -> &CandidateQueue {
        &self.theirs
    }

    fn set_content(&self, content: Weak<Content>) {
        self.content.set(content);
    }

    fn content(&self) -> Option<Arc<Content>> {
        self.content.get()
    }

    async fn establish_incoming(
        &self,
        _endpoint: Arc<Endpoint>,
        callback: Arc<dyn TransportCallback>,
        _session: Arc<Session>,
    ) {
        self.establish("incoming", callback).await;
    }

    async fn establish_outgoing(
        &self,
        _endpoint: Arc<Endpoint>,
        callback: Arc<dyn TransportCallback>,
        _session: Arc<Session>,
    ) {
        self.establish("outgoing", callback).await;
    }

    async fn handle_session_accept(&self, element: &TransportElement, _endpoint: &Arc<Endpoint>) {
        self.accepted_offers.lock().push(element.clone());
    }

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct StubManager {
    namespace: String,
    priority: u32,
    fail: bool,
}

impl StubManager {
    pub(crate) fn working(namespace: &str, priority: u32) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            priority,
            fail: false,
        })
    }

    #[allow(dead_code)]
    pub(crate) fn failing(namespace: &str, priority: u32) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            priority,
            fail: true,
        })
    }
}

impl Namespaced for StubManager {
    fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl TransportManager for StubManager {
    fn priority(&self) -> u32 {
        self.priority
    }

    fn create_for_initiator(&self, _content: &Arc<Content>) -> Arc<dyn Transport> {
        StubTransport::build(&self.namespace, self.fail)
    }

    fn create_for_responder(
        &self,
        _content: &Arc<Content>,
        _offer: &TransportElement,
    ) -> Arc<dyn Transport> {
        StubTransport::build(&self.namespace, self.fail)
    }
}

/// Listener recording every lifecycle callback.
pub(crate) struct RecordingListener {
    transitions: Mutex<Vec<(SessionState, SessionState)>>,
    accepted: AtomicUsize,
    terminations: Mutex<Vec<Reason>>,
}

impl RecordingListener {
    pub(crate) fn arc() -> Arc<Self> {
        Arc::new(Self {
            transitions: Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
            terminations: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn transitions(&self) -> Vec<(SessionState, SessionState)> {
        self.transitions.lock().clone()
    }

    #[allow(dead_code)]
    pub(crate) fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub(crate) fn terminations(&self) -> Vec<Reason> {
        self.terminations.lock().clone()
    }
}

impl SessionListener for RecordingListener {
    fn on_state_changed(&self, old: SessionState, new: SessionState) {
        self.transitions.lock().push((old, new));
    }

    fn on_session_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }

    fn on_session_terminated(&self, reason: &Reason) {
        self.terminations.lock().push(reason.clone());
    }
}
