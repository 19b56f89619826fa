//! Transport facade.
//!
//! Every actor in the handshake crates owns a mailbox of [`Event`]s. A
//! [`Transport`] opens streams and reports their lifecycle into that mailbox,
//! and hands back a [`Link`] for writing to the stream.
//!
//! Two transports are provided: [`WsTransport`] carries JSON text frames over
//! WebSocket, and [`MemoryNetwork`] connects actors inside one process.

mod event;
mod link;
mod memory;
mod transport;
mod ws;

pub use event::{Event, Mailbox, MailboxReceiver, TransportEvent, mailbox};
pub use link::Link;
pub use memory::{MemoryListener, MemoryNetwork};
pub use transport::{Accepted, Listener, Transport, TransportError};
pub use ws::{WsListener, WsTransport};
