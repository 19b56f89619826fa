//! Transport traits.

use crate::{Link, Mailbox, MailboxReceiver};
use handshake_core::Address;
use std::future::Future;
use std::io;

/// Opens outbound streams and listens for inbound ones.
pub trait Transport: Clone + Send + Sync + 'static {
    type Listener: Listener;

    /// Start connecting to `address`.
    ///
    /// Returns at once. The outcome arrives in `mailbox` as `Connected` or
    /// `NotConnected`, followed by the stream's traffic and its end.
    fn connect(&self, address: &Address, mailbox: Mailbox) -> Link;

    /// Listen for inbound streams at `address`.
    fn listen(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<Self::Listener, TransportError>> + Send;
}

/// Source of accepted streams.
pub trait Listener: Send + 'static {
    /// The address actually bound (resolves port 0).
    fn local_address(&self) -> &Address;

    /// Wait for the next inbound stream.
    fn accept(&mut self) -> impl Future<Output = Result<Accepted, TransportError>> + Send;
}

/// An inbound stream, with the mailbox its events are delivered to.
#[derive(Debug)]
pub struct Accepted {
    pub peer: Address,
    pub link: Link,
    /// Sender side of the stream's mailbox, for injecting control events.
    pub mailbox: Mailbox,
    pub events: MailboxReceiver,
}

/// Transport-level errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen at {address}: {source}")]
    Bind {
        address: Address,
        #[source]
        source: io::Error,
    },
    #[error("address {0} already in use")]
    AddressInUse(Address),
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    #[error("listener closed")]
    ListenerClosed,
    #[error("stream is closed")]
    LinkClosed,
}
