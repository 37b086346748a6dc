//! Shared test harness: two endpoints wired back-to-back over an in-memory
//! connection, plus stub description/transport/security kinds.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use accord::{
    AccordError, Bytestream, CandidateElement, CandidateQueue, Connection, Content, ContentLink,
    Creator, Description, DescriptionAdapter, DescriptionElement, DescriptionHandler, Endpoint,
    Envelope, Namespaced, PeerAddress, Reason, Reply, Result, Security, SecurityAdapter,
    SecurityCallback, SecurityElement, Senders, Session, SessionListener, SessionState, Transport,
    TransportAdapter, TransportCallback, TransportCandidate, TransportElement, TransportLink,
    TransportManager,
};

/// Description namespace used by the stub kinds.
pub const APP_NS: &str = "urn:accord:apps:test";
/// Security namespace used by the stub kinds.
pub const SEC_NS: &str = "urn:accord:security:wrap";

/// Give spawned follow-up tasks a moment to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Connection half that delivers every message to the linked peer endpoint.
pub struct LoopbackConnection {
    local: PeerAddress,
    peer: Mutex<Option<Weak<Endpoint>>>,
    sent: Mutex<Vec<Envelope>>,
}

impl LoopbackConnection {
    pub fn new(local: &str) -> Arc<Self> {
        Arc::new(Self {
            local: local.into(),
            peer: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn link(&self, peer: &Arc<Endpoint>) {
        *self.peer.lock() = Some(Arc::downgrade(peer));
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }

    fn peer(&self) -> Result<Arc<Endpoint>> {
        self.peer
            .lock()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| AccordError::Network("peer endpoint gone".to_string()))
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    fn local_address(&self) -> PeerAddress {
        self.local.clone()
    }

    async fn send(&self, envelope: Envelope) -> Result<()> {
        self.sent.lock().push(envelope.clone());
        let peer = self.peer()?;
        peer.handle_envelope(envelope).await;
        Ok(())
    }

    async fn send_and_await_reply(&self, envelope: Envelope, _timeout: Duration) -> Result<Reply> {
        self.sent.lock().push(envelope.clone());
        let peer = self.peer()?;
        Ok(peer.handle_envelope(envelope).await)
    }
}

/// Two endpoints wired to each other.
pub fn linked_endpoints(
    a: &str,
    b: &str,
) -> (
    Arc<Endpoint>,
    Arc<Endpoint>,
    Arc<LoopbackConnection>,
    Arc<LoopbackConnection>,
) {
    let conn_a = LoopbackConnection::new(a);
    let conn_b = LoopbackConnection::new(b);
    let endpoint_a = Endpoint::new(conn_a.clone());
    let endpoint_b = Endpoint::new(conn_b.clone());
    conn_a.link(&endpoint_b);
    conn_b.link(&endpoint_a);
    (endpoint_a, endpoint_b, conn_a, conn_b)
}

/// Connection that swallows every message and acknowledges requests,
/// leaving the sender's dialogue state frozen for inspection.
pub struct CapturingConnection {
    local: PeerAddress,
    sent: Mutex<Vec<Envelope>>,
}

impl CapturingConnection {
    pub fn new(local: &str) -> Arc<Self> {
        Arc::new(Self {
            local: local.into(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Connection for CapturingConnection {
    fn local_address(&self) -> PeerAddress {
        self.local.clone()
    }

    async fn send(&self, envelope: Envelope) -> Result<()> {
        self.sent.lock().push(envelope);
        Ok(())
    }

    async fn send_and_await_reply(&self, envelope: Envelope, _timeout: Duration) -> Result<Reply> {
        self.sent.lock().push(envelope);
        Ok(Reply::Ack)
    }
}

// ---------------------------------------------------------------------------
// Transport stubs
// ---------------------------------------------------------------------------

/// Candidate with a fixed id and priority.
pub struct StubCandidate {
    id: String,
    priority: u32,
    parent: TransportLink,
}

impl StubCandidate {
    pub fn new(id: &str, priority: u32) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            priority,
            parent: TransportLink::new(),
        })
    }
}

impl TransportCandidate for StubCandidate {
    fn priority(&self) -> u32 {
        self.priority
    }

    fn element(&self) -> CandidateElement {
        CandidateElement {
            id: self.id.clone(),
            priority: self.priority,
            payload: Value::Null,
        }
    }

    fn matches(&self, other: &dyn TransportCandidate) -> bool {
        self.id == other.element().id
    }

    fn set_transport(&self, transport: std::sync::Weak<dyn Transport>) {
        self.parent.set(transport);
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.parent.get()
    }
}

/// Transport whose establishment either fails immediately or yields one half
/// of an in-memory duplex stream.
pub struct StubTransport {
    namespace: String,
    fail: AtomicBool,
    ours: CandidateQueue,
    theirs: CandidateQueue,
    content: ContentLink,
    pub established: Mutex<Vec<&'static str>>,
    pub reconciled: Mutex<Vec<TransportElement>>,
    pub infos: Mutex<Vec<Value>>,
    pub cleanups: AtomicUsize,
}

impl StubTransport {
    pub fn new(namespace: &str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            fail: AtomicBool::new(fail),
            ours: CandidateQueue::new(),
            theirs: CandidateQueue::new(),
            content: ContentLink::new(),
            established: Mutex::new(Vec::new()),
            reconciled: Mutex::new(Vec::new()),
            infos: Mutex::new(Vec::new()),
            cleanups: AtomicUsize::new(0),
        })
    }

    /// Make later establishment attempts succeed.
    pub fn heal(&self) {
        self.fail.store(false, Ordering::SeqCst);
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

    fn handle_transport_info(&self, info: &Value, _envelope: &Envelope) -> Reply {
        self.infos.lock().push(info.clone());
        Reply::Ack
    }

    async fn handle_session_accept(&self, element: &TransportElement, _endpoint: &Arc<Endpoint>) {
        self.reconciled.lock().push(element.clone());
    }

    fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// Adapter producing [`StubTransport`]s and remembering every instance.
pub struct StubTransportAdapter {
    namespace: String,
    fail: bool,
    pub created: Mutex<Vec<Arc<StubTransport>>>,
}

impl StubTransportAdapter {
    pub fn working(namespace: &str) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            fail: false,
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(namespace: &str) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            fail: true,
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn created(&self) -> Vec<Arc<StubTransport>> {
        self.created.lock().clone()
    }
}

impl Namespaced for StubTransportAdapter {
    fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl TransportAdapter for StubTransportAdapter {
    fn from_element(&self, _element: &TransportElement) -> Result<Arc<dyn Transport>> {
        let transport = StubTransport::new(&self.namespace, self.fail);
        self.created.lock().push(transport.clone());
        Ok(transport)
    }
}

/// Manager producing [`StubTransport`]s for fallback selection.
pub struct StubTransportManager {
    namespace: String,
    priority: u32,
    fail: bool,
    pub created: Mutex<Vec<Arc<StubTransport>>>,
}

impl StubTransportManager {
    pub fn working(namespace: &str, priority: u32) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            priority,
            fail: false,
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(namespace: &str, priority: u32) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.to_string(),
            priority,
            fail: true,
            created: Mutex::new(Vec::new()),
        })
    }
}

impl Namespaced for StubTransportManager {
    fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl TransportManager for StubTransportManager {
    fn priority(&self) -> u32 {
        self.priority
    }

    fn create_for_initiator(&self, _content: &Arc<Content>) -> Arc<dyn Transport> {
        let transport = StubTransport::new(&self.namespace, self.fail);
        self.created.lock().push(transport.clone());
        transport
    }

    fn create_for_responder(
        &self,
        _content: &Arc<Content>,
        _offer: &TransportElement,
    ) -> Arc<dyn Transport> {
        let transport = StubTransport::new(&self.namespace, self.fail);
        self.created.lock().push(transport.clone());
        transport
    }
}

// ---------------------------------------------------------------------------
// Description stubs
// ---------------------------------------------------------------------------

/// Description that counts the byte streams handed to it.
pub struct StubDescription {
    namespace: String,
    content: ContentLink,
    pub streams: AtomicUsize,
}

impl StubDescription {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            namespace: APP_NS.to_string(),
            content: ContentLink::new(),
            streams: AtomicUsize::new(0),
        })
    }

    pub fn stream_count(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }
}

impl Namespaced for StubDescription {
    fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl Description for StubDescription {
    fn element(&self) -> DescriptionElement {
        DescriptionElement {
            namespace: self.namespace.clone(),
            payload: Value::Null,
        }
    }

    fn set_content(&self, content: Weak<Content>) {
        self.content.set(content);
    }

    fn content(&self) -> Option<Arc<Content>> {
        self.content.get()
    }

    async fn on_bytestream_ready(&self, _stream: Box<dyn Bytestream>) {
        self.streams.fetch_add(1, Ordering::SeqCst);
    }
}

/// Adapter producing [`StubDescription`]s and remembering every instance.
pub struct StubDescriptionAdapter {
    pub created: Mutex<Vec<Arc<StubDescription>>>,
}

impl StubDescriptionAdapter {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self {
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn created(&self) -> Vec<Arc<StubDescription>> {
        self.created.lock().clone()
    }
}

impl Namespaced for StubDescriptionAdapter {
    fn namespace(&self) -> &str {
        APP_NS
    }
}

impl DescriptionAdapter for StubDescriptionAdapter {
    fn from_element(
        &self,
        _creator: Creator,
        _senders: Senders,
        _name: &str,
        _disposition: Option<&str>,
        _element: &DescriptionElement,
    ) -> Result<Arc<dyn Description>> {
        let description = StubDescription::new();
        self.created.lock().push(description.clone());
        Ok(description)
    }
}

/// Application handler recording the sessions and proposals it was notified
/// about.
pub struct StubHandler {
    pub sessions: Mutex<Vec<Arc<Session>>>,
    pub proposals: Mutex<Vec<(Arc<Session>, Arc<Content>)>>,
}

impl StubHandler {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(Vec::new()),
            proposals: Mutex::new(Vec::new()),
        })
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().clone()
    }

    pub fn proposals(&self) -> Vec<(Arc<Session>, Arc<Content>)> {
        self.proposals.lock().clone()
    }
}

impl Namespaced for StubHandler {
    fn namespace(&self) -> &str {
        APP_NS
    }
}

#[async_trait]
impl DescriptionHandler for StubHandler {
    async fn on_session_initiate(&self, session: Arc<Session>) {
        self.sessions.lock().push(session);
    }

    async fn on_content_add(&self, session: Arc<Session>, content: Arc<Content>) {
        self.proposals.lock().push((session, content));
    }
}

// ---------------------------------------------------------------------------
// Security stubs
// ---------------------------------------------------------------------------

/// Security layer that passes the stream through unchanged.
pub struct StubSecurity {
    namespace: String,
    content: ContentLink,
    pub wrapped: AtomicUsize,
}

impl StubSecurity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            namespace: SEC_NS.to_string(),
            content: ContentLink::new(),
            wrapped: AtomicUsize::new(0),
        })
    }
}

impl Namespaced for StubSecurity {
    fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl Security for StubSecurity {
    fn element(&self) -> SecurityElement {
        SecurityElement {
            namespace: self.namespace.clone(),
            payload: Value::Null,
        }
    }

    fn set_content(&self, content: Weak<Content>) {
        self.content.set(content);
    }

    fn content(&self) -> Option<Arc<Content>> {
        self.content.get()
    }

    async fn decrypt_incoming(
        &self,
        stream: Box<dyn Bytestream>,
        callback: Arc<dyn SecurityCallback>,
    ) {
        self.wrapped.fetch_add(1, Ordering::SeqCst);
        callback.on_security_ready(stream).await;
    }

    async fn encrypt_outgoing(
        &self,
        stream: Box<dyn Bytestream>,
        callback: Arc<dyn SecurityCallback>,
    ) {
        self.wrapped.fetch_add(1, Ordering::SeqCst);
        callback.on_security_ready(stream).await;
    }
}

/// Adapter producing [`StubSecurity`] layers.
pub struct StubSecurityAdapter;

impl StubSecurityAdapter {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Namespaced for StubSecurityAdapter {
    fn namespace(&self) -> &str {
        SEC_NS
    }
}

impl SecurityAdapter for StubSecurityAdapter {
    fn from_element(&self, _element: &SecurityElement) -> Result<Arc<dyn Security>> {
        Ok(StubSecurity::new())
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Listener recording every lifecycle event.
pub struct EventsListener {
    pub transitions: Mutex<Vec<(SessionState, SessionState)>>,
    pub accepted: AtomicUsize,
    pub terminations: Mutex<Vec<Reason>>,
}

impl EventsListener {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self {
            transitions: Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
            terminations: Mutex::new(Vec::new()),
        })
    }

    pub fn terminations(&self) -> Vec<Reason> {
        self.terminations.lock().clone()
    }

    pub fn transitions(&self) -> Vec<(SessionState, SessionState)> {
        self.transitions.lock().clone()
    }
}

impl SessionListener for EventsListener {
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
