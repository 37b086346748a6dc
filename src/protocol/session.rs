//! Session lifecycle and request dispatch.
//!
//! A [`Session`] owns the contents negotiated with one peer, tracks the
//! session state machine and routes every inbound request either to itself
//! (session-level actions) or to the single content the request addresses.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::endpoint::Endpoint;
use crate::error::{AccordError, Result};
use crate::protocol::{
    Action, Content, Envelope, ErrorCondition, PeerAddress, Reason, ReasonCode, Reply, Role,
};
use crate::registry::Namespaced;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Prior to session-initiate.
    Fresh,
    /// Prior to session-accept.
    Pending,
    /// Post session-accept.
    Active,
    /// Terminated by cancellation.
    Cancelled,
    /// Terminated successfully.
    Ended,
}

impl SessionState {
    /// Whether the session can never leave this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Ended)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Fresh => 0,
            Self::Pending => 1,
            Self::Active => 2,
            Self::Cancelled | Self::Ended => 3,
        }
    }
}

/// Observer of one session's lifecycle.
///
/// All callbacks have empty default bodies; implement the ones of interest.
/// Listeners may add or remove listeners (including themselves) from within
/// a callback.
pub trait SessionListener: Send + Sync {
    /// The session state changed.
    fn on_state_changed(&self, old: SessionState, new: SessionState) {
        let _ = (old, new);
    }

    /// The peer accepted the session.
    fn on_session_accepted(&self) {}

    /// The session terminated, locally or by the peer.
    fn on_session_terminated(&self, reason: &Reason) {
        let _ = reason;
    }
}

/// One negotiation with one peer.
///
/// Created either locally (to initiate) or from a peer's session-initiate.
/// Registered with the endpoint's session registry under
/// `(remote peer, session id)` until termination.
pub struct Session {
    session_id: String,
    initiator: PeerAddress,
    responder: PeerAddress,
    role: Role,
    state: Mutex<SessionState>,
    contents: RwLock<HashMap<String, Arc<Content>>>,
    proposed_contents: RwLock<HashMap<String, Arc<Content>>>,
    listeners: Mutex<Vec<Arc<dyn SessionListener>>>,
    endpoint: Weak<Endpoint>,
    me: Weak<Session>,
}

impl Session {
    /// Create a fresh initiator-role session towards `responder` and
    /// register it with the endpoint.
    pub async fn initiate(endpoint: &Arc<Endpoint>, responder: PeerAddress) -> Arc<Self> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let session = Self::build(
            endpoint,
            endpoint.local_address(),
            responder,
            Role::Initiator,
            &session_id,
        );
        endpoint.sessions.register(session.clone()).await;
        session
    }

    /// Create a responder-role session from a peer's session-initiate,
    /// populating contents from the request, and register it.
    pub(crate) async fn from_initiate(
        endpoint: &Arc<Endpoint>,
        request: &Envelope,
    ) -> Result<Arc<Self>> {
        let initiator = request
            .initiator
            .clone()
            .unwrap_or_else(|| request.from.clone());
        let session = Self::build(
            endpoint,
            initiator,
            endpoint.local_address(),
            Role::Responder,
            &request.session_id,
        );
        for element in &request.contents {
            session.add_content(Content::from_element(endpoint, element)?);
        }
        session.advance_state(SessionState::Pending);
        endpoint.sessions.register(session.clone()).await;
        Ok(session)
    }

    fn build(
        endpoint: &Arc<Endpoint>,
        initiator: PeerAddress,
        responder: PeerAddress,
        role: Role,
        session_id: &str,
    ) -> Arc<Self> {
        tracing::info!(sid = session_id, ?role, "creating session");
        Arc::new_cyclic(|me| Self {
            session_id: session_id.to_string(),
            initiator,
            responder,
            role,
            state: Mutex::new(SessionState::Fresh),
            contents: RwLock::new(HashMap::new()),
            proposed_contents: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            endpoint: Arc::downgrade(endpoint),
            me: me.clone(),
        })
    }

    /// Session id, unique per negotiation.
    pub fn id(&self) -> &str {
        &self.session_id
    }

    /// Address of the session initiator.
    pub fn initiator(&self) -> &PeerAddress {
        &self.initiator
    }

    /// Address of the session responder.
    pub fn responder(&self) -> &PeerAddress {
        &self.responder
    }

    /// The local peer's role in this session.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Address of the local peer.
    pub fn local(&self) -> &PeerAddress {
        match self.role {
            Role::Initiator => &self.initiator,
            Role::Responder => &self.responder,
        }
    }

    /// Address of the remote peer.
    pub fn remote(&self) -> &PeerAddress {
        match self.role {
            Role::Initiator => &self.responder,
            Role::Responder => &self.initiator,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// The endpoint this session belongs to, while it is alive.
    pub fn endpoint(&self) -> Option<Arc<Endpoint>> {
        self.endpoint.upgrade()
    }

    fn me(&self) -> Arc<Self> {
        self.me.upgrade().expect("session self handle invalidated")
    }

    /// Add a content to the active set.
    ///
    /// Panics when the session already holds a content with the same name,
    /// active or proposed.
    pub fn add_content(&self, content: Arc<Content>) {
        let name = content.name().to_string();
        let mut contents = self.contents.write();
        let proposed = self.proposed_contents.read();
        assert!(
            !contents.contains_key(&name) && !proposed.contains_key(&name),
            "session {} already contains a content named {}",
            self.session_id,
            name
        );
        content.set_session(self.me.clone());
        contents.insert(name, content);
    }

    /// The active contents, in no particular order.
    pub fn contents(&self) -> Vec<Arc<Content>> {
        self.contents.read().values().cloned().collect()
    }

    /// The active content with the given name.
    pub fn content(&self, name: &str) -> Option<Arc<Content>> {
        self.contents.read().get(name).cloned()
    }

    /// The proposed (not yet accepted) content with the given name.
    pub fn proposed_content(&self, name: &str) -> Option<Arc<Content>> {
        self.proposed_contents.read().get(name).cloned()
    }

    /// The only active content, or `None` when the session has none.
    ///
    /// Panics when the session holds more than one content.
    pub fn sole_content(&self) -> Option<Arc<Content>> {
        let contents = self.contents.read();
        if contents.is_empty() {
            return None;
        }
        assert!(
            contents.len() == 1,
            "session {} has more than one content",
            self.session_id
        );
        contents.values().next().cloned()
    }

    /// Send session-initiate proposing this session's contents.
    ///
    /// Valid only for a fresh initiator-role session; moves the session to
    /// `Pending`.
    pub async fn send_initiate(&self) -> Result<()> {
        if self.role != Role::Initiator {
            return Err(AccordError::IllegalState(
                "session role is not initiator".to_string(),
            ));
        }
        if self.state() != SessionState::Fresh {
            return Err(AccordError::IllegalState(
                "session is not in fresh state".to_string(),
            ));
        }
        let endpoint = self.require_endpoint()?;

        let elements = self.contents().iter().map(|c| c.element()).collect();
        let envelope = Envelope::session_initiate(
            self.initiator.clone(),
            self.responder.clone(),
            &self.session_id,
            elements,
        );
        match endpoint.send_request(envelope).await? {
            Reply::Ack => {
                self.advance_state(SessionState::Pending);
                Ok(())
            }
            Reply::Error(condition) => Err(AccordError::ErrorReply(condition)),
        }
    }

    /// Accept the proposed session: start every content, then send
    /// session-accept and move to `Active`.
    pub async fn send_accept(&self) -> Result<()> {
        if self.role != Role::Responder {
            return Err(AccordError::IllegalState(
                "session role is not responder".to_string(),
            ));
        }
        if self.state() != SessionState::Pending {
            return Err(AccordError::IllegalState(
                "session is not in pending state".to_string(),
            ));
        }
        let endpoint = self.require_endpoint()?;

        let contents = self.contents();
        if contents.is_empty() {
            tracing::warn!(sid = %self.session_id, "accepting a session with no contents");
        }
        for content in &contents {
            content.start(endpoint.clone());
        }

        let elements = contents.iter().map(|c| c.element()).collect();
        let envelope = Envelope::session_accept(
            self.responder.clone(),
            self.initiator.clone(),
            &self.session_id,
            elements,
        );
        match endpoint.send_request(envelope).await? {
            Reply::Ack => {
                self.advance_state(SessionState::Active);
                Ok(())
            }
            Reply::Error(condition) => Err(AccordError::ErrorReply(condition)),
        }
    }

    /// End the session: notify listeners, send session-terminate
    /// (best-effort) and deregister from the endpoint.
    pub async fn terminate(&self, reason: Reason) {
        tracing::info!(sid = %self.session_id, code = ?reason.code, "terminating session");
        self.notify_session_terminated(&reason);

        let Some(endpoint) = self.endpoint() else {
            return;
        };
        let envelope = Envelope::session_terminate(
            self.local().clone(),
            self.remote().clone(),
            &self.session_id,
            reason,
        );
        // Deregister regardless of whether the peer acknowledged.
        if let Err(error) = endpoint.send_request(envelope).await {
            tracing::error!(sid = %self.session_id, %error, "could not send session-terminate");
        }
        endpoint.sessions.unregister(self.remote(), &self.session_id).await;
    }

    /// Propose adding a content to this session.
    ///
    /// The content joins the proposed set and a content-add is sent; it
    /// becomes active when the peer answers with content-accept.
    pub async fn propose_content(&self, content: Arc<Content>) -> Result<()> {
        let endpoint = self.require_endpoint()?;
        {
            let contents = self.contents.read();
            let mut proposed = self.proposed_contents.write();
            let name = content.name();
            assert!(
                !contents.contains_key(name) && !proposed.contains_key(name),
                "session {} already contains a content named {}",
                self.session_id,
                name
            );
            content.set_session(self.me.clone());
            proposed.insert(name.to_string(), content.clone());
        }

        let envelope = Envelope::content_add(
            self.local().clone(),
            self.remote().clone(),
            &self.session_id,
            content.element(),
        );
        match endpoint.send_request(envelope).await? {
            Reply::Ack => Ok(()),
            Reply::Error(condition) => {
                self.proposed_contents.write().remove(content.name());
                Err(AccordError::ErrorReply(condition))
            }
        }
    }

    /// Accept a content the peer proposed via content-add: adopt it into
    /// the active set, answer with content-accept and start it.
    pub async fn accept_content(&self, content: Arc<Content>) -> Result<()> {
        let endpoint = self.require_endpoint()?;
        self.add_content(content.clone());

        let envelope = Envelope::content_accept(
            self.local().clone(),
            self.remote().clone(),
            &self.session_id,
            content.element(),
        );
        match endpoint.send_request(envelope).await? {
            Reply::Ack => {
                content.start(endpoint.clone());
                Ok(())
            }
            Reply::Error(condition) => Err(AccordError::ErrorReply(condition)),
        }
    }

    /// Refuse a content the peer proposed via content-add.
    pub async fn reject_content(&self, content: Arc<Content>) -> Result<()> {
        let endpoint = self.require_endpoint()?;
        let envelope = Envelope::content_reject(
            self.local().clone(),
            self.remote().clone(),
            &self.session_id,
            content.element(),
        );
        match endpoint.send_request(envelope).await? {
            Reply::Ack => Ok(()),
            Reply::Error(condition) => Err(AccordError::ErrorReply(condition)),
        }
    }

    /// Dispatch one inbound request for this session.
    pub async fn handle_request(&self, request: &Envelope) -> Reply {
        tracing::debug!(sid = %self.session_id, action = %request.action, "handling request");
        let Some(endpoint) = self.endpoint() else {
            tracing::warn!(sid = %self.session_id, "request for a session without an endpoint");
            return Reply::Error(ErrorCondition::ItemNotFound);
        };

        match request.action {
            Action::ContentModify
            | Action::DescriptionInfo
            | Action::SecurityInfo
            | Action::SessionInfo
            | Action::TransportAccept
            | Action::TransportInfo
            | Action::TransportReject
            | Action::TransportReplace => self
                .sole_affected_content(request)
                .handle_request(request, &endpoint),

            Action::ContentAccept => self.handle_content_accept(request, &endpoint),
            Action::ContentAdd => self.handle_content_add(request, &endpoint),
            Action::ContentReject => self.handle_content_reject(request),
            Action::ContentRemove => Reply::Error(ErrorCondition::FeatureNotImplemented),
            Action::SessionAccept => self.handle_session_accept(request, &endpoint),
            Action::SessionInitiate => self.handle_session_initiate(&endpoint),
            Action::SessionTerminate => self.handle_session_terminate(request, &endpoint).await,
        }
    }

    /// The single content a content-scoped request addresses.
    ///
    /// Panics when the request references more or fewer than one content or
    /// an unknown name; the action set guarantees neither can happen with a
    /// validated message.
    fn sole_affected_content(&self, request: &Envelope) -> Arc<Content> {
        assert!(
            request.contents.len() == 1,
            "expected exactly one content in {} request, got {}",
            request.action,
            request.contents.len()
        );
        let name = &request.contents[0].name;
        self.content(name)
            .unwrap_or_else(|| panic!("unknown content name: {name}"))
    }

    /// Peer accepted the session. Contents whose required security layer
    /// the peer ignored are dropped with a `security-error` termination;
    /// the rest reconcile their transports and start.
    fn handle_session_accept(&self, request: &Envelope, endpoint: &Arc<Endpoint>) -> Reply {
        self.advance_state(SessionState::Active);

        for content in self.contents() {
            let Some(element) = request.content_named(content.name()) else {
                panic!("session-accept does not contain content {}", content.name());
            };

            if content.security().is_some() && element.security.is_none() {
                tracing::warn!(
                    sid = %self.session_id,
                    content = content.name(),
                    "peer ignored required security layer"
                );
                self.contents.write().remove(content.name());
                let this = self.me();
                tokio::spawn(async move {
                    this.terminate(
                        Reason::new(ReasonCode::SecurityError)
                            .with_text("security layer not supported by peer"),
                    )
                    .await;
                });
                continue;
            }

            let request = request.clone();
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                content.handle_session_accept(&request, &endpoint).await;
            });
        }
        Reply::Ack
    }

    /// Deliver a freshly parsed session-initiate to the application layer.
    ///
    /// A description namespace without a registered handler terminates the
    /// session with `unsupported-applications`.
    fn handle_session_initiate(&self, endpoint: &Arc<Endpoint>) -> Reply {
        tracing::info!(sid = %self.session_id, remote = %self.remote(), "session proposed by peer");
        let Some(content) = self.sole_content() else {
            return Reply::Error(ErrorCondition::BadRequest);
        };

        let handler = content
            .description()
            .and_then(|d| endpoint.description_handlers.lookup(d.namespace()));
        let this = self.me();
        tokio::spawn(async move {
            match handler {
                Some(handler) => handler.on_session_initiate(this).await,
                None => {
                    tracing::warn!(sid = %this.session_id, "unsupported description kind");
                    this.terminate(Reason::new(ReasonCode::UnsupportedApplications)).await;
                }
            }
        });
        Reply::Ack
    }

    /// Peer ended the session.
    async fn handle_session_terminate(&self, request: &Envelope, endpoint: &Arc<Endpoint>) -> Reply {
        let Some(reason) = request.reason.clone() else {
            panic!("session-terminate without a reason");
        };

        match reason.code {
            ReasonCode::Cancel => self.advance_state(SessionState::Cancelled),
            ReasonCode::Success => self.advance_state(SessionState::Ended),
            _ => {}
        }

        self.notify_session_terminated(&reason);
        endpoint.sessions.unregister(self.remote(), &self.session_id).await;
        Reply::Ack
    }

    /// Peer accepted contents we proposed: promote each from proposed to
    /// active and start it.
    fn handle_content_accept(&self, request: &Envelope, endpoint: &Arc<Endpoint>) -> Reply {
        for element in &request.contents {
            let accepted = {
                let mut contents = self.contents.write();
                let mut proposed = self.proposed_contents.write();
                let Some(accepted) = proposed.remove(&element.name) else {
                    panic!("content-accept for unknown proposed content: {}", element.name);
                };
                contents.insert(element.name.clone(), accepted.clone());
                accepted
            };
            accepted.handle_content_accept(request, endpoint);
        }
        Reply::Ack
    }

    /// Peer proposed an additional content; the registered description
    /// handler arbitrates, out of band.
    fn handle_content_add(&self, request: &Envelope, endpoint: &Arc<Endpoint>) -> Reply {
        assert!(
            request.contents.len() == 1,
            "expected exactly one content in content-add request, got {}",
            request.contents.len()
        );
        let element = &request.contents[0];

        let content = match Content::from_element(endpoint, element) {
            Ok(content) => content,
            Err(error) => {
                tracing::warn!(sid = %self.session_id, %error, "malformed content-add");
                return Reply::Error(ErrorCondition::BadRequest);
            }
        };
        content.set_session(self.me.clone());

        let Some(description) = content.description() else {
            panic!("content-add without a description");
        };
        let handler = endpoint
            .description_handlers
            .lookup(description.namespace())
            .unwrap_or_else(|| {
                panic!("no description handler for namespace {}", description.namespace())
            });

        let this = self.me();
        tokio::spawn(async move {
            handler.on_content_add(this, content).await;
        });
        Reply::Ack
    }

    /// Peer rejected contents we proposed: drop them from the proposed set.
    fn handle_content_reject(&self, request: &Envelope) -> Reply {
        for element in &request.contents {
            let removed = self.proposed_contents.write().remove(&element.name);
            assert!(
                removed.is_some(),
                "content-reject for unknown proposed content: {}",
                element.name
            );
            tracing::info!(
                sid = %self.session_id,
                content = %element.name,
                "proposed content rejected by peer"
            );
        }
        Reply::Ack
    }

    /// A content's payload exchange finished. The sole content finishing
    /// ends the whole session with `success`.
    pub(crate) async fn on_content_finished(&self, name: &str) {
        let sole = {
            let contents = self.contents.read();
            if !contents.contains_key(name) {
                tracing::warn!(sid = %self.session_id, content = name, "finished content is unknown");
                return;
            }
            contents.len() == 1
        };
        if sole {
            self.terminate(Reason::new(ReasonCode::Success)).await;
        }
    }

    /// A content's payload exchange was cancelled. Cancelling the sole
    /// content cancels the whole session.
    pub(crate) async fn on_content_cancelled(&self, name: &str) {
        let sole = {
            let contents = self.contents.read();
            if !contents.contains_key(name) {
                tracing::warn!(sid = %self.session_id, content = name, "cancelled content is unknown");
                return;
            }
            contents.len() == 1
        };
        if sole {
            self.terminate(Reason::new(ReasonCode::Cancel)).await;
        } else {
            self.contents.write().remove(name);
            tracing::info!(sid = %self.session_id, content = name, "content cancelled");
        }
    }

    /// Register a lifecycle listener.
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.lock().push(listener);
    }

    /// Deregister a lifecycle listener.
    pub fn remove_listener(&self, listener: &Arc<dyn SessionListener>) {
        self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Move the state machine forward, notifying listeners.
    ///
    /// Transitions that would move backwards, or out of a terminal state,
    /// are ignored.
    pub(crate) fn advance_state(&self, new_state: SessionState) {
        let old_state = {
            let mut state = self.state.lock();
            let old = *state;
            if old == new_state {
                return;
            }
            if old.is_terminal() || new_state.rank() <= old.rank() {
                tracing::warn!(
                    sid = %self.session_id,
                    ?old,
                    ?new_state,
                    "ignoring non-forward state transition"
                );
                return;
            }
            *state = new_state;
            old
        };
        for listener in self.listeners_snapshot() {
            listener.on_state_changed(old_state, new_state);
        }
    }

    pub(crate) fn notify_session_accepted(&self) {
        for listener in self.listeners_snapshot() {
            listener.on_session_accepted();
        }
    }

    fn notify_session_terminated(&self, reason: &Reason) {
        for listener in self.listeners_snapshot() {
            listener.on_session_terminated(reason);
        }
    }

    // Copy-then-iterate keeps fan-out safe when a callback mutates the list.
    fn listeners_snapshot(&self) -> Vec<Arc<dyn SessionListener>> {
        self.listeners.lock().clone()
    }

    fn require_endpoint(&self) -> Result<Arc<Endpoint>> {
        self.endpoint()
            .ok_or_else(|| AccordError::IllegalState("endpoint no longer exists".to_string()))
    }
}
