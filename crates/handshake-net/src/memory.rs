//! In-process transport.
//!
//! Streams are pairs of channels between actors of the same process. Used
//! by tests, and by programs that host both ends of a handshake.

use crate::link::Outbound;
use crate::{Accepted, Event, Link, Listener, Mailbox, Transport, TransportError, TransportEvent};
use handshake_core::Address;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const HOST: &str = "memory";

type Registry = Arc<Mutex<HashMap<Address, mpsc::UnboundedSender<Accepted>>>>;

/// A private network of in-process listeners.
#[derive(Debug, Clone)]
pub struct MemoryNetwork {
    listeners: Registry,
    next_port: Arc<AtomicU16>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self {
            listeners: Arc::default(),
            next_port: Arc::new(AtomicU16::new(49152)),
        }
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn ephemeral(&self) -> Address {
        Address::new(HOST, self.next_port.fetch_add(1, Ordering::Relaxed))
    }

    fn lookup(&self, address: &Address) -> Option<mpsc::UnboundedSender<Accepted>> {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.get(address).cloned()
    }
}

impl Transport for MemoryNetwork {
    type Listener = MemoryListener;

    fn connect(&self, address: &Address, mailbox: Mailbox) -> Link {
        let (client_link, client_out) = Link::channel();

        let Some(listener) = self.lookup(address) else {
            let _ = mailbox.send(Event::from(TransportEvent::NotConnected {
                reason: format!("nothing listening at {address}"),
            }));
            return client_link;
        };

        let (server_link, server_out) = Link::channel();
        let (server_mailbox, server_events) = crate::mailbox();
        let accepted = Accepted {
            peer: self.ephemeral(),
            link: server_link,
            mailbox: server_mailbox.clone(),
            events: server_events,
        };

        if listener.send(accepted).is_err() {
            let _ = mailbox.send(Event::from(TransportEvent::NotConnected {
                reason: format!("listener at {address} is gone"),
            }));
            return client_link;
        }

        let _ = mailbox.send(Event::from(TransportEvent::Connected {
            peer: address.clone(),
        }));
        tokio::spawn(forward(client_out, server_mailbox.clone(), mailbox.clone()));
        tokio::spawn(forward(server_out, mailbox, server_mailbox));

        client_link
    }

    async fn listen(&self, address: &Address) -> Result<MemoryListener, TransportError> {
        let address = if address.port == 0 {
            self.ephemeral()
        } else {
            address.clone()
        };

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            if listeners.contains_key(&address) {
                return Err(TransportError::AddressInUse(address));
            }
            listeners.insert(address.clone(), tx);
        }

        Ok(MemoryListener {
            address,
            inbound: rx,
            registry: self.listeners.clone(),
        })
    }
}

/// Deliver one direction of a stream until its writer closes it.
async fn forward(mut outbound: mpsc::UnboundedReceiver<Outbound>, peer: Mailbox, own: Mailbox) {
    while let Some(out) = outbound.recv().await {
        match out {
            Outbound::Message(msg) => {
                let _ = peer.send(TransportEvent::Received(msg).into());
            }
            Outbound::Close => {
                let _ = peer.send(TransportEvent::Closed.into());
                let _ = own.send(TransportEvent::Closed.into());
                return;
            }
            Outbound::Abandon(reason) => {
                let _ = peer.send(Event::from(TransportEvent::Abandoned {
                    reason: reason.clone(),
                }));
                let _ = own.send(Event::from(TransportEvent::Abandoned { reason }));
                return;
            }
        }
    }
    let _ = peer.send(TransportEvent::Closed.into());
}

/// Listener registered on a [`MemoryNetwork`]; unregisters on drop.
#[derive(Debug)]
pub struct MemoryListener {
    address: Address,
    inbound: mpsc::UnboundedReceiver<Accepted>,
    registry: Registry,
}

impl Listener for MemoryListener {
    fn local_address(&self) -> &Address {
        &self.address
    }

    async fn accept(&mut self) -> Result<Accepted, TransportError> {
        self.inbound.recv().await.ok_or(TransportError::ListenerClosed)
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        let mut listeners = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        listeners.remove(&self.address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox;
    use handshake_core::{Greeting, Identity};

    #[tokio::test]
    async fn connect_without_listener_fails() {
        let net = MemoryNetwork::new();
        let (tx, mut rx) = mailbox();
        let link = net.connect(&Address::new(HOST, 1), tx);

        assert!(matches!(
            rx.recv().await,
            Some(Event::Transport(TransportEvent::NotConnected { .. }))
        ));
        assert!(!link.is_open());
    }

    #[tokio::test]
    async fn messages_and_close_reach_the_peer() {
        let net = MemoryNetwork::new();
        let mut listener = net.listen(&Address::new(HOST, 0)).await.unwrap();
        let target = listener.local_address().clone();

        let (tx, mut client) = mailbox();
        let link = net.connect(&target, tx);
        let mut accepted = listener.accept().await.unwrap();
        assert_eq!(
            client.recv().await,
            Some(Event::Transport(TransportEvent::Connected { peer: target }))
        );

        link.send(Greeting::new("Gladys")).unwrap();
        let greeting = match accepted.events.recv().await {
            Some(Event::Transport(TransportEvent::Received(msg))) => msg,
            other => panic!("expected a message, got {other:?}"),
        };

        let handshake_core::WireMessage::Greeting(greeting) = greeting else {
            panic!("expected greeting");
        };
        accepted
            .link
            .send(greeting.acknowledge(&Identity::new("Buster")))
            .unwrap();
        assert!(matches!(
            client.recv().await,
            Some(Event::Transport(TransportEvent::Received(_)))
        ));

        drop(link);
        assert_eq!(
            accepted.events.recv().await,
            Some(Event::Transport(TransportEvent::Closed))
        );
    }

    #[tokio::test]
    async fn abandon_is_reported_to_both_ends() {
        let net = MemoryNetwork::new();
        let mut listener = net.listen(&Address::new(HOST, 0)).await.unwrap();
        let (tx, mut client) = mailbox();
        let _link = net.connect(listener.local_address(), tx);
        let accepted = listener.accept().await.unwrap();
        let mut server = accepted.events;
        client.recv().await;

        accepted.link.abandon("reset");
        assert_eq!(
            client.recv().await,
            Some(Event::Transport(TransportEvent::Abandoned {
                reason: "reset".into()
            }))
        );
        assert_eq!(
            server.recv().await,
            Some(Event::Transport(TransportEvent::Abandoned {
                reason: "reset".into()
            }))
        );
    }

    #[tokio::test]
    async fn dropped_listener_frees_the_address() {
        let net = MemoryNetwork::new();
        let address = Address::new(HOST, 7);
        let listener = net.listen(&address).await.unwrap();
        assert!(matches!(
            net.listen(&address).await,
            Err(TransportError::AddressInUse(_))
        ));
        drop(listener);
        assert!(net.listen(&address).await.is_ok());
    }
}
