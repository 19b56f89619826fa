//! Per-stream session.

use handshake_core::{Address, Greeting, GreetingPolicy, Identity, Outcome, ProtocolViolation, WireMessage};
use handshake_net::{Accepted, Event, Link, Mailbox, MailboxReceiver, TransportEvent};

/// Supervisor-assigned session number.
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingGreeting,
    Acknowledged,
}

enum Step {
    Continue,
    Finish(Outcome),
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnd {
    pub id: SessionId,
    pub peer: Address,
    pub outcome: Outcome,
    /// Greetings acknowledged over the session's life.
    pub rounds: u32,
}

/// The accepting half of the handshake for one stream.
///
/// A session starts already connected, waiting for a greeting. It answers
/// greetings according to its [`GreetingPolicy`] until the stream ends or it
/// is stopped.
pub struct Session {
    id: SessionId,
    peer: Address,
    local_identity: Identity,
    policy: GreetingPolicy,
    state: State,
    rounds: u32,
    link: Link,
    events: MailboxReceiver,
}

impl Session {
    /// Bind a session to an accepted stream. The returned mailbox stops it.
    pub fn new(
        id: SessionId,
        accepted: Accepted,
        local_identity: Identity,
        policy: GreetingPolicy,
    ) -> (Self, Mailbox) {
        let Accepted {
            peer,
            link,
            mailbox,
            events,
        } = accepted;

        let session = Self {
            id,
            peer,
            local_identity,
            policy,
            state: State::AwaitingGreeting,
            rounds: 0,
            link,
            events,
        };
        (session, mailbox)
    }

    pub async fn run(mut self) -> SessionEnd {
        tracing::debug!("Session {} started for {}", self.id, self.peer);
        let outcome = loop {
            let Some(event) = self.events.recv().await else {
                break Outcome::PeerClosed;
            };
            if let Step::Finish(outcome) = self.handle(event) {
                break outcome;
            }
        };

        tracing::debug!("Session {} with {} ended: {}", self.id, self.peer, outcome);
        SessionEnd {
            id: self.id,
            peer: self.peer,
            outcome,
            rounds: self.rounds,
        }
    }

    fn handle(&mut self, event: Event) -> Step {
        match event {
            Event::Transport(TransportEvent::Received(WireMessage::Greeting(greeting))) => {
                self.on_greeting(greeting)
            }
            Event::Transport(TransportEvent::Closed) => Step::Finish(Outcome::PeerClosed),
            Event::Transport(TransportEvent::Abandoned { reason }) => {
                Step::Finish(Outcome::PeerAbandoned { reason })
            }
            Event::Stop => Step::Finish(Outcome::Aborted),
            event => {
                tracing::warn!(
                    "Session {}: unexpected {} in state {:?}, dropped",
                    self.id,
                    event.tag(),
                    self.state
                );
                Step::Continue
            }
        }
    }

    fn on_greeting(&mut self, greeting: Greeting) -> Step {
        if self.state == State::Acknowledged && self.policy == GreetingPolicy::SingleShot {
            return Step::Finish(
                ProtocolViolation::DuplicateGreeting {
                    sender: greeting.sender_name,
                }
                .into(),
            );
        }

        let ack = greeting.acknowledge(&self.local_identity);
        if let Err(e) = self.link.send(ack.clone()) {
            return Step::Finish(Outcome::PeerAbandoned {
                reason: e.to_string(),
            });
        }

        self.rounds += 1;
        self.state = State::Acknowledged;
        tracing::info!(
            "Session {}: {} greeted, acknowledged as {}",
            self.id,
            ack.addressed_to,
            ack.responder_name
        );
        Step::Continue
    }
}
