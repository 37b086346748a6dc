//! Description layer abstraction.
//!
//! A [`Description`] is the semantic payload a content negotiates — what is
//! actually being sent or received once the byte stream is up. The core
//! never interprets it: once transport (and security, when present) are
//! ready, the stream is handed to the description and the negotiation
//! machinery steps aside.
//!
//! Applications observe new sessions and content proposals through a
//! [`DescriptionHandler`] registered for their description namespace; a
//! session-initiate whose description has no registered handler is
//! terminated with `unsupported-applications`.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;

use crate::connection::Bytestream;
use crate::protocol::{
    Content, Creator, DescriptionElement, Envelope, Reply, Senders, Session,
};
use crate::registry::Namespaced;

/// The payload definition of one content.
#[async_trait]
pub trait Description: Namespaced + Send + Sync {
    /// Wire representation.
    fn element(&self) -> DescriptionElement;

    /// Attach the owning content.
    fn set_content(&self, content: Weak<Content>);

    /// The owning content, if still alive.
    fn content(&self) -> Option<Arc<Content>>;

    /// The (possibly security-wrapped) byte stream is ready; payload logic
    /// takes over from here.
    async fn on_bytestream_ready(&self, stream: Box<dyn Bytestream>);

    /// Process a description-specific sub-message and produce the reply.
    /// The default refuses all sub-messages.
    fn handle_description_info(&self, info: &Value, envelope: &Envelope) -> Reply {
        let _ = (info, envelope);
        Reply::Error(crate::protocol::ErrorCondition::FeatureNotImplemented)
    }
}

/// Factory reconstructing a [`Description`] from its wire form.
pub trait DescriptionAdapter: Namespaced + Send + Sync {
    /// Build the description proposed by `element` for a content with the
    /// given attributes.
    fn from_element(
        &self,
        creator: Creator,
        senders: Senders,
        name: &str,
        disposition: Option<&str>,
        element: &DescriptionElement,
    ) -> crate::error::Result<Arc<dyn Description>>;
}

/// Application-side observer for one description namespace.
///
/// The core notifies the handler of inbound proposals; accepting or
/// rejecting them (e.g. via [`Session::send_accept`] or
/// [`Session::terminate`]) is the handler's decision, out of band.
#[async_trait]
pub trait DescriptionHandler: Namespaced + Send + Sync {
    /// A peer proposed a new session whose contents use this namespace.
    async fn on_session_initiate(&self, session: Arc<Session>);

    /// A peer proposed adding `content` to an existing session.
    async fn on_content_add(&self, session: Arc<Session>, content: Arc<Content>);
}
