//! Connection-layer contract.
//!
//! The core never talks to the network directly. An implementation of
//! [`Connection`] carries [`Envelope`]s between peers and owns retries,
//! timeouts and delivery ordering; its failures surface here as ordinary
//! [`AccordError`](crate::error::AccordError) values and are handled like
//! any other operational failure.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::protocol::{Envelope, PeerAddress, Reply};

/// Transport-send contract the core requires from its host.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Address of the local peer, used as the `from` of outbound messages.
    fn local_address(&self) -> PeerAddress;

    /// Fire-and-forget delivery of a message.
    async fn send(&self, envelope: Envelope) -> Result<()>;

    /// Deliver a message and await the correlated reply.
    ///
    /// `timeout` is a hint; the implementation must eventually resolve with
    /// either the peer's reply or an error (e.g.
    /// [`AccordError::Timeout`](crate::error::AccordError::Timeout)).
    async fn send_and_await_reply(&self, envelope: Envelope, timeout: Duration) -> Result<Reply>;
}

/// An established out-of-band byte stream.
///
/// Produced by a [`Transport`](crate::transport::Transport) once
/// establishment succeeds, optionally wrapped by a
/// [`Security`](crate::security::Security) layer, and finally handed to the
/// content's [`Description`](crate::description::Description). Passed by
/// value through the callback chain, so a "ready" callback can never observe
/// a missing stream.
pub trait Bytestream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + ?Sized> Bytestream for T {}
