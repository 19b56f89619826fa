//! Mailbox events.

use handshake_core::{Address, WireMessage};
use tokio::sync::mpsc;

/// Lifecycle and traffic of one stream, as reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected { peer: Address },
    NotConnected { reason: String },
    Received(WireMessage),
    Closed,
    Abandoned { reason: String },
}

/// Everything an actor can find in its mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Transport(TransportEvent),
    /// The actor's own handshake timer fired.
    TimerExpired,
    Stop,
}

impl Event {
    /// Short name of the event, for logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Transport(TransportEvent::Connected { .. }) => "connected",
            Self::Transport(TransportEvent::NotConnected { .. }) => "not_connected",
            Self::Transport(TransportEvent::Received(msg)) => msg.kind(),
            Self::Transport(TransportEvent::Closed) => "closed",
            Self::Transport(TransportEvent::Abandoned { .. }) => "abandoned",
            Self::TimerExpired => "timer_expired",
            Self::Stop => "stop",
        }
    }
}

impl From<TransportEvent> for Event {
    fn from(event: TransportEvent) -> Self {
        Self::Transport(event)
    }
}

pub type Mailbox = mpsc::UnboundedSender<Event>;
pub type MailboxReceiver = mpsc::UnboundedReceiver<Event>;

/// Create a new actor mailbox.
pub fn mailbox() -> (Mailbox, MailboxReceiver) {
    mpsc::unbounded_channel()
}
