//! Connection state machine.
//!
//! One [`Connection`] is one handshake attempt over one stream:
//!
//! ```text
//! Initial --Start--> Pending --Connected--> Connected --Acknowledgement--> Done
//! ```
//!
//! Every non-terminal state also ends on `Stop` (Aborted). `Pending` ends on
//! `NotConnected`; `Connected` ends on `Closed`, `Abandoned` or the handshake
//! timer. Anything else is logged and dropped without a transition. A
//! connection never retries; that is the owner's decision.

use handshake_core::{Address, Greeting, Identity, Outcome, ProtocolViolation, WireMessage};
use handshake_net::{Event, Link, Mailbox, MailboxReceiver, Transport, TransportEvent, mailbox};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Initial,
    /// Waiting for the transport to resolve the connect.
    Pending,
    /// Greeting sent, waiting for the acknowledgement.
    Connected,
    Done,
}

/// Reported to an observer every time a connection changes state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub label: String,
    pub state: State,
}

/// A stream whose handshake completed, handed over to the owner.
#[derive(Debug)]
pub struct Established {
    pub peer: Address,
    pub link: Link,
    /// The stream's remaining traffic and lifecycle events.
    pub events: MailboxReceiver,
}

/// What a connection leaves behind.
#[derive(Debug)]
pub struct Finished {
    pub outcome: Outcome,
    /// Present only when `outcome` is a success.
    pub established: Option<Established>,
}

impl Finished {
    fn failed(outcome: Outcome) -> Self {
        Self {
            outcome,
            established: None,
        }
    }
}

enum Step {
    Continue,
    Finish(Outcome),
}

/// Handshake response timer; fires into the owner's mailbox.
///
/// Dropping the timer cancels it.
struct Timer(JoinHandle<()>);

impl Timer {
    fn start(after: Duration, mailbox: Mailbox) -> Self {
        Self(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = mailbox.send(Event::TimerExpired);
        }))
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// One handshake attempt, run as its own task.
pub struct Connection<T: Transport> {
    label: String,
    address: Address,
    local_identity: Identity,
    timeout: Duration,
    transport: T,
    state: State,
    peer: Option<Address>,
    link: Option<Link>,
    deadline: Option<Instant>,
    timer: Option<Timer>,
    observer: Option<mpsc::UnboundedSender<Transition>>,
    mailbox: Mailbox,
    events: MailboxReceiver,
}

impl<T: Transport> Connection<T> {
    pub fn new(
        label: impl Into<String>,
        address: Address,
        local_identity: Identity,
        timeout: Duration,
        transport: T,
    ) -> Self {
        let (mailbox, events) = mailbox();
        Self {
            label: label.into(),
            address,
            local_identity,
            timeout,
            transport,
            state: State::Initial,
            peer: None,
            link: None,
            deadline: None,
            timer: None,
            observer: None,
            mailbox,
            events,
        }
    }

    /// Report every state change on `observer`.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<Transition>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// When the pending acknowledgement is due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run the state machine on its own task. Nothing happens until
    /// [`ConnectionHandle::start`] is called.
    pub fn spawn(self) -> ConnectionHandle {
        let mailbox = self.mailbox.clone();
        let task = tokio::spawn(self.run());
        ConnectionHandle { mailbox, task }
    }

    async fn run(mut self) -> Finished {
        while let Some(event) = self.events.recv().await {
            tracing::trace!("{} [{:?}] <- {}", self.label, self.state, event.tag());
            if let Step::Finish(outcome) = self.handle(event) {
                return self.finish(outcome);
            }
        }
        // Unreachable while we hold our own mailbox sender.
        self.finish(Outcome::Aborted)
    }

    fn handle(&mut self, event: Event) -> Step {
        use TransportEvent::*;

        match (self.state, event) {
            (State::Initial, Event::Start) => {
                tracing::debug!("{}: connecting to {}", self.label, self.address);
                let link = self.transport.connect(&self.address, self.mailbox.clone());
                self.link = Some(link);
                self.enter(State::Pending);
                Step::Continue
            }

            (State::Pending, Event::Transport(Connected { peer })) => {
                let greeting = Greeting::new(self.local_identity.clone());
                let sent = match &self.link {
                    Some(link) => link.send(greeting),
                    None => Err(handshake_net::TransportError::LinkClosed),
                };
                if let Err(e) = sent {
                    return Step::Finish(Outcome::PeerAbandoned {
                        reason: e.to_string(),
                    });
                }

                tracing::debug!("{}: connected to {}, greeting sent", self.label, peer);
                self.peer = Some(peer);
                self.deadline = Some(Instant::now() + self.timeout);
                self.timer = Some(Timer::start(self.timeout, self.mailbox.clone()));
                self.enter(State::Connected);
                Step::Continue
            }
            (State::Pending, Event::Transport(NotConnected { reason })) => {
                Step::Finish(Outcome::ConnectFailed {
                    address: self.address.clone(),
                    reason,
                })
            }

            (State::Connected, Event::Transport(Received(WireMessage::Acknowledgement(ack)))) => {
                match ack.verify(&self.local_identity) {
                    Ok(()) => Step::Finish(Outcome::Acknowledged(ack)),
                    Err(violation) => Step::Finish(violation.into()),
                }
            }
            (State::Connected, Event::Transport(Received(WireMessage::Greeting(greeting)))) => {
                tracing::warn!(
                    "{}: {} (from {}), dropped",
                    self.label,
                    ProtocolViolation::UnexpectedGreeting,
                    greeting.sender_name
                );
                Step::Continue
            }
            (State::Connected, Event::Transport(Closed)) => Step::Finish(Outcome::PeerClosed),
            (State::Connected, Event::Transport(Abandoned { reason })) => {
                Step::Finish(Outcome::PeerAbandoned { reason })
            }
            (State::Connected, Event::TimerExpired) => Step::Finish(Outcome::Timeout {
                after: self.timeout,
            }),

            (State::Initial | State::Pending | State::Connected, Event::Stop) => {
                Step::Finish(Outcome::Aborted)
            }

            (state, event) => {
                tracing::warn!(
                    "{}: unexpected {} in state {:?}, dropped",
                    self.label,
                    event.tag(),
                    state
                );
                Step::Continue
            }
        }
    }

    fn enter(&mut self, state: State) {
        self.state = state;
        if let Some(observer) = &self.observer {
            let _ = observer.send(Transition {
                label: self.label.clone(),
                state,
            });
        }
    }

    fn finish(mut self, outcome: Outcome) -> Finished {
        self.timer = None;
        self.deadline = None;
        self.enter(State::Done);

        if outcome.is_success() {
            tracing::debug!("{}: {}", self.label, outcome);
        } else {
            tracing::info!("{}: {}", self.label, outcome);
        }

        match (outcome.is_success(), self.link.take(), self.peer.take()) {
            (true, Some(link), Some(peer)) => Finished {
                outcome,
                established: Some(Established {
                    peer,
                    link,
                    events: self.events,
                }),
            },
            // Dropping the link closes the stream.
            _ => Finished::failed(outcome),
        }
    }
}

/// Owner's handle on a spawned [`Connection`].
#[derive(Debug)]
pub struct ConnectionHandle {
    mailbox: Mailbox,
    task: JoinHandle<Finished>,
}

impl ConnectionHandle {
    pub fn start(&self) {
        let _ = self.mailbox.send(Event::Start);
    }

    /// Ask the connection to abort at its next event.
    pub fn stop(&self) {
        let _ = self.mailbox.send(Event::Stop);
    }

    /// A sender into the connection's mailbox, for stopping it from elsewhere.
    pub fn control(&self) -> Mailbox {
        self.mailbox.clone()
    }

    /// Wait for the terminal outcome.
    pub async fn join(self) -> Finished {
        match self.task.await {
            Ok(finished) => finished,
            Err(e) => {
                tracing::error!("Connection task failed: {}", e);
                Finished::failed(Outcome::Aborted)
            }
        }
    }
}

/// Make a single handshake attempt and wait for its outcome.
pub async fn connect_once<T: Transport>(
    transport: T,
    address: Address,
    local_identity: Identity,
    timeout: Duration,
) -> Finished {
    let label = address.to_string();
    let handle = Connection::new(label, address, local_identity, timeout, transport).spawn();
    handle.start();
    handle.join().await
}
