//! Write side of a stream.

use crate::TransportError;
use handshake_core::WireMessage;
use tokio::sync::mpsc;

#[derive(Debug)]
pub(crate) enum Outbound {
    Message(WireMessage),
    Close,
    Abandon(String),
}

/// Handle for writing to one stream.
///
/// Clones share the stream. Dropping every clone closes it, the same as
/// calling [`Link::close`].
#[derive(Debug, Clone)]
pub struct Link {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Link {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message for the peer.
    pub fn send(&self, message: impl Into<WireMessage>) -> Result<(), TransportError> {
        self.tx
            .send(Outbound::Message(message.into()))
            .map_err(|_| TransportError::LinkClosed)
    }

    /// Close the stream in an orderly way; the peer sees `Closed`.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Drop the stream without a closing exchange; the peer sees `Abandoned`.
    pub fn abandon(&self, reason: impl Into<String>) {
        let _ = self.tx.send(Outbound::Abandon(reason.into()));
    }

    /// Whether the stream is still accepting writes.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}
