//! WebSocket transport.
//!
//! Each stream is a WebSocket over TCP carrying one JSON-encoded
//! [`WireMessage`] per text frame. A task per stream moves frames between the
//! socket and the owner's mailbox.

use crate::link::Outbound;
use crate::{Accepted, Event, Link, Listener, Mailbox, Transport, TransportError, TransportEvent, mailbox};
use futures_util::{SinkExt, StreamExt};
use handshake_core::{Address, WireMessage};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

/// Connects and listens with `ws://host:port` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WsTransport {
    type Listener = WsListener;

    fn connect(&self, address: &Address, mailbox: Mailbox) -> Link {
        let (link, outbound) = Link::channel();
        let address = address.clone();

        tokio::spawn(async move {
            let url = format!("ws://{address}");
            let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    tracing::debug!("Cannot connect to {}: {}", address, e);
                    let _ = mailbox.send(Event::from(TransportEvent::NotConnected {
                        reason: e.to_string(),
                    }));
                    return;
                }
            };

            let connected = TransportEvent::Connected {
                peer: address.clone(),
            };
            if mailbox.send(connected.into()).is_err() {
                return;
            }
            pump(ws, outbound, mailbox, &address).await;
        });

        link
    }

    async fn listen(&self, address: &Address) -> Result<WsListener, TransportError> {
        let listener = TcpListener::bind((address.host.as_str(), address.port))
            .await
            .map_err(|source| TransportError::Bind {
                address: address.clone(),
                source,
            })?;
        let local = listener
            .local_addr()
            .map(Address::from)
            .unwrap_or_else(|_| address.clone());

        tracing::info!("Listening on ws://{}", local);
        Ok(WsListener { listener, local })
    }
}

/// Accepts WebSocket streams on a bound TCP socket.
#[derive(Debug)]
pub struct WsListener {
    listener: TcpListener,
    local: Address,
}

impl Listener for WsListener {
    fn local_address(&self) -> &Address {
        &self.local
    }

    async fn accept(&mut self) -> Result<Accepted, TransportError> {
        let (stream, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        let peer = Address::from(peer);
        let (link, outbound) = Link::channel();
        let (tx, events) = mailbox();

        // The upgrade runs on the stream's own task so a slow client cannot
        // hold up the accept loop.
        let task_mailbox = tx.clone();
        let task_peer = peer.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => pump(ws, outbound, task_mailbox, &task_peer).await,
                Err(e) => {
                    tracing::debug!("WebSocket upgrade from {} failed: {}", task_peer, e);
                    let _ = task_mailbox.send(Event::from(TransportEvent::Abandoned {
                        reason: e.to_string(),
                    }));
                }
            }
        });

        Ok(Accepted {
            peer,
            link,
            mailbox: tx,
            events,
        })
    }
}

/// Move traffic between one socket and its owner until either side ends.
async fn pump<S>(
    ws: WebSocketStream<S>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    mailbox: Mailbox,
    peer: &Address,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Message(msg)) => {
                    let text = match serde_json::to_string(&msg) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!("Cannot encode {} for {}: {}", msg.kind(), peer, e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        let _ = mailbox.send(abandoned(e.to_string()));
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.close().await;
                    let _ = mailbox.send(TransportEvent::Closed.into());
                    return;
                }
                Some(Outbound::Abandon(reason)) => {
                    tracing::debug!("Abandoning stream to {}: {}", peer, reason);
                    let _ = mailbox.send(abandoned(reason));
                    return;
                }
            },

            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<WireMessage>(text.as_str()) {
                        Ok(msg) => {
                            let _ = mailbox.send(TransportEvent::Received(msg).into());
                        }
                        Err(e) => tracing::warn!("Invalid message from {}: {}", peer, e),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    let _ = mailbox.send(TransportEvent::Closed.into());
                    return;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::debug!("WebSocket error from {}: {}", peer, e);
                    let _ = mailbox.send(abandoned(e.to_string()));
                    return;
                }
            },

            // Owner is gone; nobody is left to read the stream.
            _ = mailbox.closed() => {
                let _ = sink.close().await;
                return;
            }
        }
    }
}

fn abandoned(reason: String) -> Event {
    TransportEvent::Abandoned { reason }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use handshake_core::Greeting;

    #[tokio::test]
    async fn unreachable_address_reports_not_connected() {
        // Bind then drop to find a port nobody is listening on.
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let (tx, mut rx) = mailbox();
        let _link = WsTransport::new().connect(&Address::new("127.0.0.1", port), tx);

        match rx.recv().await {
            Some(Event::Transport(TransportEvent::NotConnected { .. })) => {}
            other => panic!("expected NotConnected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn frames_cross_the_socket() {
        let transport = WsTransport::new();
        let mut listener = transport
            .listen(&Address::new("127.0.0.1", 0))
            .await
            .unwrap();
        let target = listener.local_address().clone();

        let (tx, mut rx) = mailbox();
        let link = transport.connect(&target, tx);
        let mut accepted = listener.accept().await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(Event::Transport(TransportEvent::Connected { peer: target }))
        );

        link.send(Greeting::new("Gladys")).unwrap();
        assert_eq!(
            accepted.events.recv().await,
            Some(Event::Transport(TransportEvent::Received(
                Greeting::new("Gladys").into()
            )))
        );

        link.close();
        loop {
            match accepted.events.recv().await {
                Some(Event::Transport(TransportEvent::Closed)) => break,
                Some(Event::Transport(TransportEvent::Abandoned { .. })) => break,
                Some(other) => panic!("unexpected {other:?}"),
                None => panic!("mailbox ended without Closed"),
            }
        }
    }
}
