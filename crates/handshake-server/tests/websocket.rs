//! End-to-end handshakes over real WebSocket streams.

use handshake_client::{Group, GroupStatus, connect_once};
use handshake_core::{
    Acknowledgement, Address, Backoff, ClientSettings, Identity, Outcome, RetryPolicy,
    ServerSettings, WireMessage,
};
use handshake_net::{Event, Transport, TransportEvent, WsTransport, mailbox};
use handshake_server::{SupervisorReport, listen};
use std::collections::BTreeMap;
use std::time::Duration;

async fn buster() -> handshake_server::SupervisorHandle {
    let settings = ServerSettings {
        address: Address::new("127.0.0.1", 0),
        ..ServerSettings::default()
    };
    listen(&WsTransport::new(), &settings).await.unwrap()
}

#[tokio::test]
async fn gladys_greets_buster() {
    let mut server = buster().await;
    let at = server.local_address().clone();

    let finished = connect_once(
        WsTransport::new(),
        at,
        Identity::new("Gladys"),
        Duration::from_secs(3),
    )
    .await;

    assert_eq!(
        finished.outcome,
        Outcome::Acknowledged(Acknowledgement {
            responder_name: Identity::new("Buster"),
            addressed_to: Identity::new("Gladys"),
        })
    );

    drop(finished.established);
    let ended = loop {
        match server.next().await.unwrap() {
            SupervisorReport::SessionEnded(end) => break end,
            SupervisorReport::Accepted { .. } => continue,
        }
    };
    assert_eq!(ended.outcome, Outcome::PeerClosed);
    assert_eq!(ended.rounds, 1);

    assert_eq!(server.stop().await, Outcome::Aborted);
}

#[tokio::test]
async fn wire_exchange_is_greeting_then_acknowledgement() {
    let server = buster().await;
    let (tx, mut events) = mailbox();
    let link = WsTransport::new().connect(server.local_address(), tx);

    assert!(matches!(
        events.recv().await,
        Some(Event::Transport(TransportEvent::Connected { .. }))
    ));
    link.send(WireMessage::Greeting(handshake_core::Greeting::new("Gladys")))
        .unwrap();
    assert_eq!(
        events.recv().await,
        Some(Event::Transport(TransportEvent::Received(
            WireMessage::Acknowledgement(Acknowledgement {
                responder_name: Identity::new("Buster"),
                addressed_to: Identity::new("Gladys"),
            })
        )))
    );

    server.stop().await;
}

#[tokio::test]
async fn group_over_websocket_becomes_ready() {
    let server = buster().await;
    let settings = ClientSettings {
        members: BTreeMap::from([("server".to_string(), server.local_address().clone())]),
        retry: RetryPolicy::new(Backoff::Fixed { delay_ms: 50 }, Some(3)),
        ..ClientSettings::default()
    };

    let mut group = Group::from_settings(&settings, WsTransport::new());
    loop {
        match group.next().await.unwrap() {
            GroupStatus::Ready => break,
            GroupStatus::Completed(outcome) => panic!("group gave up: {outcome}"),
            GroupStatus::Update(_) => continue,
        }
    }

    assert_eq!(group.stop().await, Outcome::Aborted);
    assert_eq!(server.stop().await, Outcome::Aborted);
}
