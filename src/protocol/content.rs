//! Content: the unit of negotiation.
//!
//! A content binds one description, one transport and at most one security
//! layer under a session-unique name. It owns the transport-replacement
//! sub-dialogue: failed or rejected transport kinds are blacklisted and the
//! next best kind is proposed, until either a transport sticks or the
//! session is terminated with `failed-transport`.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::Bytestream;
use crate::description::Description;
use crate::endpoint::Endpoint;
use crate::error::{AccordError, Result};
use crate::protocol::{
    random_content_name, Action, ContentElement, Creator, Envelope, ErrorCondition, Reason,
    ReasonCode, Reply, Role, Senders, Session,
};
use crate::registry::Namespaced;
use crate::security::{Security, SecurityCallback};
use crate::transport::{Transport, TransportCallback};

/// A named negotiable unit within a session.
///
/// Created either locally (to be proposed) or from a peer's proposal, then
/// mutated throughout negotiation: description, transport and security may
/// be swapped before data flows, and the transport may be replaced at any
/// time via the replacement sub-dialogue.
pub struct Content {
    name: String,
    creator: Creator,
    disposition: Option<String>,
    senders: Mutex<Senders>,
    description: Mutex<Option<Arc<dyn Description>>>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    security: Mutex<Option<Arc<dyn Security>>>,
    /// Non-null strictly between proposing a replacement transport and its
    /// resolution (accept / reject / tie-break).
    pending_replacing_transport: Mutex<Option<Arc<dyn Transport>>>,
    /// Transport namespaces never to be re-offered for this content.
    transport_blacklist: Mutex<HashSet<String>>,
    session: Mutex<Option<Weak<Session>>>,
    me: Weak<Content>,
}

impl Content {
    /// Create an empty content with a generated name.
    pub fn new(creator: Creator, senders: Senders) -> Arc<Self> {
        Self::with_parts(None, None, None, &random_content_name(), None, creator, senders)
    }

    /// Create a content from its parts.
    pub fn with_parts(
        description: Option<Arc<dyn Description>>,
        transport: Option<Arc<dyn Transport>>,
        security: Option<Arc<dyn Security>>,
        name: &str,
        disposition: Option<String>,
        creator: Creator,
        senders: Senders,
    ) -> Arc<Self> {
        let content = Arc::new_cyclic(|me| Self {
            name: name.to_string(),
            creator,
            disposition,
            senders: Mutex::new(senders),
            description: Mutex::new(None),
            transport: Mutex::new(None),
            security: Mutex::new(None),
            pending_replacing_transport: Mutex::new(None),
            transport_blacklist: Mutex::new(HashSet::new()),
            session: Mutex::new(None),
            me: me.clone(),
        });

        if let Some(description) = description {
            content.set_description(description);
        }
        if let Some(transport) = transport {
            content.set_transport(transport);
        }
        if let Some(security) = security {
            content.set_security(security);
        }
        content
    }

    /// Reconstruct a content from a peer's wire element.
    ///
    /// Panics when a present description/transport/security namespace has no
    /// registered adapter: the surrounding message was already validated, so
    /// an unsupported namespace here is a contract violation, not input to
    /// tolerate. Adapter parse failures surface as errors.
    pub(crate) fn from_element(
        endpoint: &Arc<Endpoint>,
        element: &ContentElement,
    ) -> Result<Arc<Self>> {
        let description = match &element.description {
            Some(description_element) => {
                let adapter = endpoint
                    .descriptions
                    .lookup(&description_element.namespace)
                    .unwrap_or_else(|| {
                        panic!(
                            "unsupported description namespace: {}",
                            description_element.namespace
                        )
                    });
                Some(adapter.from_element(
                    element.creator,
                    element.senders,
                    &element.name,
                    element.disposition.as_deref(),
                    description_element,
                )?)
            }
            None => None,
        };

        let transport = match &element.transport {
            Some(transport_element) => {
                let adapter = endpoint
                    .transports
                    .lookup(&transport_element.namespace)
                    .unwrap_or_else(|| {
                        panic!(
                            "unsupported transport namespace: {}",
                            transport_element.namespace
                        )
                    });
                Some(adapter.from_element(transport_element)?)
            }
            None => None,
        };

        let security = match &element.security {
            Some(security_element) => {
                let adapter = endpoint
                    .securities
                    .lookup(&security_element.namespace)
                    .unwrap_or_else(|| {
                        panic!(
                            "unsupported security namespace: {}",
                            security_element.namespace
                        )
                    });
                Some(adapter.from_element(security_element)?)
            }
            None => None,
        };

        Ok(Self::with_parts(
            description,
            transport,
            security,
            &element.name,
            element.disposition.clone(),
            element.creator,
            element.senders,
        ))
    }

    /// Name of the content, unique within its session.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Party that created the content.
    pub fn creator(&self) -> Creator {
        self.creator
    }

    /// Free-text disposition.
    pub fn disposition(&self) -> Option<&str> {
        self.disposition.as_deref()
    }

    /// Current senders policy.
    pub fn senders(&self) -> Senders {
        *self.senders.lock()
    }

    /// Change the senders policy.
    pub fn set_senders(&self, senders: Senders) {
        *self.senders.lock() = senders;
    }

    /// The content's description, if set.
    pub fn description(&self) -> Option<Arc<dyn Description>> {
        self.description.lock().clone()
    }

    /// Set the description and claim ownership of it.
    pub fn set_description(&self, description: Arc<dyn Description>) {
        description.set_content(self.me.clone());
        *self.description.lock() = Some(description);
    }

    /// The content's transport, if set.
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.lock().clone()
    }

    /// Set the transport and claim ownership of it.
    pub fn set_transport(&self, transport: Arc<dyn Transport>) {
        transport.set_content(self.me.clone());
        *self.transport.lock() = Some(transport);
    }

    /// The content's security layer, if set.
    pub fn security(&self) -> Option<Arc<dyn Security>> {
        self.security.lock().clone()
    }

    /// Set the security layer and claim ownership of it.
    pub fn set_security(&self, security: Arc<dyn Security>) {
        security.set_content(self.me.clone());
        *self.security.lock() = Some(security);
    }

    /// The owning session, while it is alive.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_session(&self, session: Weak<Session>) {
        *self.session.lock() = Some(session);
    }

    /// Transport namespaces this content will never re-propose.
    pub fn transport_blacklist(&self) -> HashSet<String> {
        self.transport_blacklist.lock().clone()
    }

    /// The replacement transport currently awaiting the peer's answer.
    pub fn pending_replacement(&self) -> Option<Arc<dyn Transport>> {
        self.pending_replacing_transport.lock().clone()
    }

    fn blacklist_namespace(&self, namespace: &str) {
        self.transport_blacklist.lock().insert(namespace.to_string());
    }

    fn me(&self) -> Arc<Self> {
        self.me.upgrade().expect("content self handle invalidated")
    }

    /// Whether the local peer sends data for this content.
    pub fn is_sending(&self) -> bool {
        let Some(session) = self.session() else {
            return false;
        };
        matches!(
            (self.senders(), session.role()),
            (Senders::Initiator, Role::Initiator)
                | (Senders::Responder, Role::Responder)
                | (Senders::Both, _)
        )
    }

    /// Whether the local peer receives data for this content.
    pub fn is_receiving(&self) -> bool {
        let Some(session) = self.session() else {
            return false;
        };
        matches!(
            (self.senders(), session.role()),
            (Senders::Initiator, Role::Responder)
                | (Senders::Responder, Role::Initiator)
                | (Senders::Both, _)
        )
    }

    /// Wire representation. Parts that are not set are omitted.
    pub fn element(&self) -> ContentElement {
        ContentElement {
            creator: self.creator,
            name: self.name.clone(),
            senders: self.senders(),
            disposition: self.disposition.clone(),
            description: self.description().map(|d| d.element()),
            transport: self.transport().map(|t| t.element()),
            security: self.security().map(|s| s.element()),
        }
    }

    /// Dispatch a content-scoped request.
    pub(crate) fn handle_request(&self, request: &Envelope, endpoint: &Arc<Endpoint>) -> Reply {
        match request.action {
            Action::ContentModify => Reply::Error(ErrorCondition::FeatureNotImplemented),
            Action::DescriptionInfo => Reply::Error(ErrorCondition::FeatureNotImplemented),
            Action::SecurityInfo => Reply::Error(ErrorCondition::FeatureNotImplemented),
            Action::SessionInfo => Reply::Ack,
            Action::TransportAccept => self.handle_transport_accept(request, endpoint),
            Action::TransportInfo => self.handle_transport_info(request),
            Action::TransportReject => self.handle_transport_reject(request, endpoint),
            Action::TransportReplace => self.handle_transport_replace(request, endpoint),
            other => unreachable!("action {other} is not content-scoped"),
        }
    }

    /// Peer accepted our proposed replacement: promote it and start.
    fn handle_transport_accept(&self, _request: &Envelope, endpoint: &Arc<Endpoint>) -> Reply {
        let Some(replacement) = self.pending_replacing_transport.lock().take() else {
            tracing::warn!(
                content = %self.name,
                "transport-accept without a pending transport replacement"
            );
            return Reply::Error(ErrorCondition::OutOfOrder);
        };

        if let Some(old) = self.transport.lock().take() {
            old.cleanup();
        }
        self.set_transport(replacement);
        self.start(endpoint.clone());
        Reply::Ack
    }

    /// Delegate a transport sub-message to the transport kind.
    fn handle_transport_info(&self, request: &Envelope) -> Reply {
        let Some(element) = request.content_named(&self.name) else {
            panic!("transport-info does not address content {}", self.name);
        };
        let Some(info) = element.transport.as_ref().and_then(|t| t.info.as_ref()) else {
            return Reply::Error(ErrorCondition::BadRequest);
        };
        let Some(transport) = self.transport() else {
            return Reply::Error(ErrorCondition::BadRequest);
        };
        transport.handle_transport_info(info, request)
    }

    /// Peer refused our proposed replacement: blacklist it and try the next
    /// transport kind.
    fn handle_transport_reject(&self, _request: &Envelope, endpoint: &Arc<Endpoint>) -> Reply {
        let Some(rejected) = self.pending_replacing_transport.lock().take() else {
            panic!(
                "transport-reject for content {} with no replacement pending",
                self.name
            );
        };
        self.blacklist_namespace(rejected.namespace());

        let this = self.me();
        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            if let Err(error) = this.replace_transport(&endpoint).await {
                tracing::error!(
                    content = %this.name,
                    %error,
                    "could not replace rejected transport"
                );
            }
        });
        Reply::Ack
    }

    /// Peer proposed replacing our transport.
    fn handle_transport_replace(&self, request: &Envelope, endpoint: &Arc<Endpoint>) -> Reply {
        // Both sides proposed at once: this proposal loses.
        if self.pending_replacing_transport.lock().is_some() {
            tracing::info!(
                content = %self.name,
                "simultaneous transport-replace, answering tie-break"
            );
            return Reply::Error(ErrorCondition::TieBreak);
        }

        let Some(element) = request.content_named(&self.name) else {
            panic!("transport-replace does not address content {}", self.name);
        };
        let Some(offer) = element.transport.as_ref() else {
            return Reply::Error(ErrorCondition::BadRequest);
        };

        let session = self.session().expect("content not attached to a session");
        let manager = endpoint.transport_managers.by_namespace(&offer.namespace);
        let refused =
            manager.is_none() || self.transport_blacklist.lock().contains(&offer.namespace);

        if refused {
            let envelope = Envelope::transport_reject(
                session.local().clone(),
                session.remote().clone(),
                session.id(),
                self.creator,
                &self.name,
                offer.clone(),
            );
            let endpoint = endpoint.clone();
            let name = self.name.clone();
            tokio::spawn(async move {
                if let Err(error) = endpoint.send_request(envelope).await {
                    tracing::error!(content = %name, %error, "could not send transport-reject");
                }
            });
            return Reply::Ack;
        }

        let manager = manager.expect("refusal handled above");
        if let Some(current) = self.transport.lock().take() {
            self.blacklist_namespace(current.namespace());
            current.cleanup();
        }
        let replacement = manager.create_for_responder(&self.me(), offer);
        self.set_transport(replacement.clone());

        let envelope = Envelope::transport_accept(
            session.local().clone(),
            session.remote().clone(),
            session.id(),
            self.creator,
            &self.name,
            replacement.element(),
        );
        let send_endpoint = endpoint.clone();
        let name = self.name.clone();
        tokio::spawn(async move {
            if let Err(error) = send_endpoint.send_request(envelope).await {
                tracing::error!(content = %name, %error, "could not send transport-accept");
            }
        });

        self.start(endpoint.clone());
        Reply::Ack
    }

    /// Peer accepted this proposed content: move to the data phase.
    pub(crate) fn handle_content_accept(&self, _request: &Envelope, endpoint: &Arc<Endpoint>) {
        self.start(endpoint.clone());
    }

    /// Peer accepted the session: reconcile the transport and start.
    pub(crate) async fn handle_session_accept(&self, request: &Envelope, endpoint: &Arc<Endpoint>) {
        let Some(element) = request.content_named(&self.name) else {
            panic!("session-accept does not contain content {}", self.name);
        };
        let session = self.session().expect("content not attached to a session");
        session.notify_session_accepted();

        if let (Some(transport), Some(offer)) = (self.transport(), element.transport.as_ref()) {
            transport.handle_session_accept(offer, endpoint).await;
        }
        self.start(endpoint.clone());
    }

    /// Begin moving data: prepare transport and security, then establish
    /// the byte stream in the negotiated direction. Establishment runs on a
    /// spawned task and reports back through the callback contract.
    pub(crate) fn start(&self, endpoint: Arc<Endpoint>) {
        let this = self.me();
        tokio::spawn(async move {
            let Some(transport) = this.transport() else {
                tracing::warn!(content = %this.name, "start without a transport");
                return;
            };
            let Some(session) = this.session() else {
                tracing::warn!(content = %this.name, "start on a detached content");
                return;
            };

            transport.prepare(&endpoint).await;
            if let Some(security) = this.security() {
                security.prepare(&endpoint, session.remote()).await;
            }

            let callback: Arc<dyn TransportCallback> = this.clone();
            if this.is_receiving() {
                tracing::info!(content = %this.name, "establishing incoming byte stream");
                transport.establish_incoming(endpoint, callback, session).await;
            } else if this.is_sending() {
                tracing::info!(content = %this.name, "establishing outgoing byte stream");
                transport.establish_outgoing(endpoint, callback, session).await;
            } else {
                tracing::warn!(
                    content = %this.name,
                    "neither sending nor receiving, assuming receiving"
                );
                transport.establish_incoming(endpoint, callback, session).await;
            }
        });
    }

    /// Propose replacing this content's transport with the best remaining
    /// kind. Terminates the session with `failed-transport` when no usable
    /// kind remains.
    ///
    /// Panics when a replacement is already pending: the single
    /// `pending_replacing_transport` slot serializes the sub-dialogue, and a
    /// second proposal indicates a broken caller.
    pub async fn replace_transport(&self, endpoint: &Arc<Endpoint>) -> Result<()> {
        assert!(
            self.pending_replacing_transport.lock().is_none(),
            "transport replacement already pending for content {}",
            self.name
        );

        let session = self.session().ok_or_else(|| {
            AccordError::IllegalState("content not attached to a session".to_string())
        })?;

        let blacklist = self.transport_blacklist.lock().clone();
        let manager = endpoint
            .transport_managers
            .best_available(&endpoint.config().transport_preference, &blacklist);
        let Some(manager) = manager else {
            tracing::warn!(content = %self.name, "no usable transport remains, terminating");
            session.terminate(Reason::new(ReasonCode::FailedTransport)).await;
            return Ok(());
        };

        let this = self.me();
        let replacement = manager.create_for_initiator(&this);
        replacement.set_content(Arc::downgrade(&this));
        let element = replacement.element();
        *self.pending_replacing_transport.lock() = Some(replacement);

        let envelope = Envelope::transport_replace(
            session.local().clone(),
            session.remote().clone(),
            session.id(),
            self.creator,
            &self.name,
            element,
        );

        match endpoint.send_request(envelope).await {
            Ok(Reply::Ack) => Ok(()),
            Ok(Reply::Error(ErrorCondition::TieBreak)) => {
                tracing::info!(
                    content = %self.name,
                    "transport-replace lost the tie-break, backing off"
                );
                *self.pending_replacing_transport.lock() = None;
                Ok(())
            }
            Ok(Reply::Error(condition)) => {
                *self.pending_replacing_transport.lock() = None;
                Err(AccordError::ErrorReply(condition))
            }
            Err(error) => {
                *self.pending_replacing_transport.lock() = None;
                Err(error)
            }
        }
    }

    /// Signal that this content's payload exchange finished successfully.
    pub async fn complete(&self) {
        if let Some(session) = self.session() {
            session.on_content_finished(&self.name).await;
        }
    }

    /// Signal that this content's payload exchange was cancelled.
    pub async fn cancel(&self) {
        if let Some(session) = self.session() {
            session.on_content_cancelled(&self.name).await;
        }
    }
}

#[async_trait]
impl TransportCallback for Content {
    async fn on_transport_ready(&self, stream: Box<dyn Bytestream>) {
        tracing::info!(
            content = %self.name,
            receiving = self.is_receiving(),
            "transport ready"
        );

        // Payload hand-off may outlive this callback; run it detached.
        let this = self.me();
        tokio::spawn(async move {
            if let Some(security) = this.security() {
                let callback: Arc<dyn SecurityCallback> = this.clone();
                if this.is_receiving() {
                    tracing::info!(content = %this.name, "decrypting incoming byte stream");
                    security.decrypt_incoming(stream, callback).await;
                } else if this.is_sending() {
                    tracing::info!(content = %this.name, "encrypting outgoing byte stream");
                    security.encrypt_outgoing(stream, callback).await;
                }
            } else if let Some(description) = this.description() {
                description.on_bytestream_ready(stream).await;
            } else {
                tracing::warn!(content = %this.name, "byte stream ready without a description");
            }
        });
    }

    async fn on_transport_failed(&self, error: AccordError) {
        let Some(transport) = self.transport() else {
            return;
        };
        tracing::error!(
            content = %self.name,
            namespace = transport.namespace(),
            %error,
            "transport failed"
        );
        self.blacklist_namespace(transport.namespace());

        let Some(session) = self.session() else {
            return;
        };
        // Responders wait for the initiator's transport-replace.
        if session.role() == Role::Initiator {
            let Some(endpoint) = session.endpoint() else {
                return;
            };
            if let Err(error) = self.replace_transport(&endpoint).await {
                tracing::error!(content = %self.name, %error, "could not send transport-replace");
            }
        }
    }
}

#[async_trait]
impl SecurityCallback for Content {
    async fn on_security_ready(&self, stream: Box<dyn Bytestream>) {
        if let Some(description) = self.description() {
            description.on_bytestream_ready(stream).await;
        }
    }

    async fn on_security_failed(&self, error: AccordError) {
        // The description layer notices the dead stream; nothing to unwind.
        tracing::error!(content = %self.name, %error, "security layer failed");
    }
}

/// Back-reference from a description/transport/security to its content.
///
/// Embed this in concrete kinds to satisfy their `set_content`/`content`
/// contract.
#[derive(Default)]
pub struct ContentLink(Mutex<Option<Weak<Content>>>);

impl ContentLink {
    /// Create an unattached link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the link at a content.
    pub fn set(&self, content: Weak<Content>) {
        *self.0.lock() = Some(content);
    }

    /// The linked content, if set and still alive.
    pub fn get(&self) -> Option<Arc<Content>> {
        self.0.lock().as_ref().and_then(Weak::upgrade)
    }
}
