//! Security layer abstraction.
//!
//! A [`Security`] wraps a content's established byte stream with an
//! encryption/decryption layer before the stream reaches the description.
//! The layer is optional per content; concrete kinds are resolved by
//! namespace. Wrapping mirrors the transport-establishment discipline:
//! asynchronous, with the outcome reported through [`SecurityCallback`]
//! exactly once.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;

use crate::connection::Bytestream;
use crate::endpoint::Endpoint;
use crate::error::AccordError;
use crate::protocol::{Content, Envelope, PeerAddress, Reply, SecurityElement};
use crate::registry::Namespaced;

/// An encryption/decryption wrapper around an established byte stream.
#[async_trait]
pub trait Security: Namespaced + Send + Sync {
    /// Wire representation.
    fn element(&self) -> SecurityElement;

    /// Attach the owning content.
    fn set_content(&self, content: Weak<Content>);

    /// The owning content, if still alive.
    fn content(&self) -> Option<Arc<Content>>;

    /// Prime keys/session material before the byte stream exists. The
    /// default does nothing.
    async fn prepare(&self, endpoint: &Arc<Endpoint>, peer: &PeerAddress) {
        let _ = (endpoint, peer);
    }

    /// Wrap an incoming byte stream for reading.
    ///
    /// Reports the outcome through `callback` exactly once.
    async fn decrypt_incoming(&self, stream: Box<dyn Bytestream>, callback: Arc<dyn SecurityCallback>);

    /// Wrap an outgoing byte stream for writing.
    ///
    /// Reports the outcome through `callback` exactly once.
    async fn encrypt_outgoing(&self, stream: Box<dyn Bytestream>, callback: Arc<dyn SecurityCallback>);

    /// Process a security-specific sub-message and produce the reply.
    /// The default refuses all sub-messages.
    fn handle_security_info(&self, info: &Value, envelope: &Envelope) -> Reply {
        let _ = (info, envelope);
        Reply::Error(crate::protocol::ErrorCondition::FeatureNotImplemented)
    }
}

/// Outcome callbacks for byte-stream wrapping.
#[async_trait]
pub trait SecurityCallback: Send + Sync {
    /// The wrapped stream is ready for the description layer.
    async fn on_security_ready(&self, stream: Box<dyn Bytestream>);

    /// Wrapping failed. The content logs this; detection of the dead stream
    /// is left to the description layer.
    async fn on_security_failed(&self, error: AccordError);
}

/// Factory reconstructing a [`Security`] from its wire form.
pub trait SecurityAdapter: Namespaced + Send + Sync {
    /// Build the security layer described by `element`.
    fn from_element(&self, element: &SecurityElement) -> crate::error::Result<Arc<dyn Security>>;
}
