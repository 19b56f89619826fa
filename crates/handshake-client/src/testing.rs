//! Scripted peers for tests.

use handshake_core::{Acknowledgement, Address, Identity, WireMessage};
use handshake_net::{Accepted, Event, Listener, MemoryNetwork, Transport, TransportEvent};
use tokio::task::JoinHandle;

/// How a scripted server treats each greeting.
#[derive(Debug, Clone, Copy)]
pub enum Responder {
    /// Acknowledge as the given name.
    Answer(&'static str),
    /// Acknowledge as the first name, addressed to the second.
    Misaddress(&'static str, &'static str),
    /// Never answer, keep the stream open.
    Silent,
    Close,
    Abandon,
}

/// Listen on a fresh in-memory address and serve every stream with `responder`.
pub async fn listen(net: &MemoryNetwork, responder: Responder) -> (Address, JoinHandle<()>) {
    let mut listener = net
        .listen(&Address::new("memory", 0))
        .await
        .expect("memory listen");
    let address = listener.local_address().clone();

    let task = tokio::spawn(async move {
        while let Ok(accepted) = listener.accept().await {
            tokio::spawn(serve(accepted, responder));
        }
    });
    (address, task)
}

async fn serve(mut accepted: Accepted, responder: Responder) {
    while let Some(event) = accepted.events.recv().await {
        let greeting = match event {
            Event::Transport(TransportEvent::Received(WireMessage::Greeting(g))) => g,
            Event::Transport(TransportEvent::Closed | TransportEvent::Abandoned { .. }) => return,
            _ => continue,
        };
        match responder {
            Responder::Answer(name) => {
                let _ = accepted.link.send(greeting.acknowledge(&Identity::new(name)));
            }
            Responder::Misaddress(name, to) => {
                let _ = accepted.link.send(Acknowledgement {
                    responder_name: Identity::new(name),
                    addressed_to: Identity::new(to),
                });
            }
            Responder::Silent => {}
            Responder::Close => accepted.link.close(),
            Responder::Abandon => accepted.link.abandon("reset by peer"),
        }
    }
}
