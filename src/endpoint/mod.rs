//! Local protocol stack and session registry.
//!
//! An [`Endpoint`] bundles everything one peer needs to negotiate: the
//! connection used to reach other peers, the adapter registries resolving
//! namespaces to concrete kinds, the transport-manager registry used for
//! fallback selection, the application-side description handlers and the
//! registry of live sessions.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;

use crate::config::EndpointConfig;
use crate::connection::Connection;
use crate::description::{DescriptionAdapter, DescriptionHandler};
use crate::error::Result;
use crate::protocol::{
    Action, Envelope, ErrorCondition, PeerAddress, Reply, Session,
};
use crate::registry::{Registry, TransportManagerRegistry};
use crate::security::SecurityAdapter;
use crate::transport::TransportAdapter;

/// The local peer's protocol stack.
pub struct Endpoint {
    connection: Arc<dyn Connection>,
    config: EndpointConfig,
    /// Description adapters by namespace.
    pub descriptions: Registry<dyn DescriptionAdapter>,
    /// Transport adapters by namespace.
    pub transports: Registry<dyn TransportAdapter>,
    /// Security adapters by namespace.
    pub securities: Registry<dyn SecurityAdapter>,
    /// Application handlers by description namespace.
    pub description_handlers: Registry<dyn DescriptionHandler>,
    /// Transport factories, ordered for fallback selection.
    pub transport_managers: TransportManagerRegistry,
    /// Live sessions by (remote peer, session id).
    pub sessions: SessionRegistry,
    me: Weak<Endpoint>,
}

impl Endpoint {
    /// Create an endpoint with default configuration.
    pub fn new(connection: Arc<dyn Connection>) -> Arc<Self> {
        Self::with_config(connection, EndpointConfig::default())
    }

    /// Create an endpoint with the given configuration.
    pub fn with_config(connection: Arc<dyn Connection>, config: EndpointConfig) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            connection,
            config,
            descriptions: Registry::new(),
            transports: Registry::new(),
            securities: Registry::new(),
            description_handlers: Registry::new(),
            transport_managers: TransportManagerRegistry::new(),
            sessions: SessionRegistry::new(),
            me: me.clone(),
        })
    }

    /// The connection this endpoint communicates through.
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// The endpoint configuration.
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Address of the local peer.
    pub fn local_address(&self) -> PeerAddress {
        self.connection.local_address()
    }

    /// Fire-and-forget delivery of a message.
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        self.connection.send(envelope).await
    }

    /// Deliver a message and await the correlated reply, using the
    /// configured request timeout.
    pub async fn send_request(&self, envelope: Envelope) -> Result<Reply> {
        self.connection
            .send_and_await_reply(envelope, self.config.request_timeout())
            .await
    }

    /// Route one inbound message to its session.
    ///
    /// A session-initiate for an unknown session id creates and registers a
    /// responder-role session; any other action for an unknown session is
    /// answered with `item-not-found`.
    pub async fn handle_envelope(&self, envelope: Envelope) -> Reply {
        if let Some(session) = self.sessions.get(&envelope.from, &envelope.session_id).await {
            return session.handle_request(&envelope).await;
        }

        if envelope.action == Action::SessionInitiate {
            let endpoint = self.me.upgrade().expect("endpoint self handle invalidated");
            match Session::from_initiate(&endpoint, &envelope).await {
                Ok(session) => session.handle_request(&envelope).await,
                Err(error) => {
                    tracing::warn!(
                        sid = %envelope.session_id,
                        %error,
                        "could not parse session-initiate"
                    );
                    Reply::Error(ErrorCondition::BadRequest)
                }
            }
        } else {
            tracing::warn!(
                sid = %envelope.session_id,
                from = %envelope.from,
                action = %envelope.action,
                "message for unknown session"
            );
            Reply::Error(ErrorCondition::ItemNotFound)
        }
    }
}

/// Live sessions, keyed by (remote peer, session id).
///
/// Sessions register on creation and deregister on termination; inbound
/// messages are routed through this registry.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<(PeerAddress, String), Arc<Session>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session under its remote peer and id.
    pub async fn register(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        let key = (session.remote().clone(), session.id().to_string());
        self.sessions.write().await.insert(key, session)
    }

    /// Deregister the session for a peer and id.
    pub async fn unregister(&self, remote: &PeerAddress, session_id: &str) -> Option<Arc<Session>> {
        let key = (remote.clone(), session_id.to_string());
        self.sessions.write().await.remove(&key)
    }

    /// Look up the session for a peer and id.
    pub async fn get(&self, remote: &PeerAddress, session_id: &str) -> Option<Arc<Session>> {
        let key = (remote.clone(), session_id.to_string());
        self.sessions.read().await.get(&key).cloned()
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Session ids of every live session.
    pub async fn list_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .await
            .keys()
            .map(|(_, sid)| sid.clone())
            .collect()
    }
}
