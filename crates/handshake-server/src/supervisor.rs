//! Session supervisor.

use crate::{Session, SessionEnd, SessionId};
use handshake_core::{Address, GreetingPolicy, Identity, Outcome, ServerSettings};
use handshake_net::{Accepted, Event, Listener, Mailbox, Transport, TransportError};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{self, JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;

/// Pause after an accept failure that is not tied to one stream, such as
/// running out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Notification to the supervisor's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorReport {
    Accepted { id: SessionId, peer: Address },
    SessionEnded(SessionEnd),
}

/// Accepts streams and runs one isolated [`Session`] per stream.
pub struct Supervisor<L: Listener> {
    listener: L,
    local_identity: Identity,
    policy: GreetingPolicy,
    sessions: JoinSet<SessionEnd>,
    live: HashMap<SessionId, Mailbox>,
    /// Session and peer behind each task, for reaping a task that panicked.
    tasks: HashMap<task::Id, (SessionId, Address)>,
    next_id: SessionId,
    control: mpsc::UnboundedReceiver<()>,
    reports: mpsc::UnboundedSender<SupervisorReport>,
}

impl<L: Listener> Supervisor<L> {
    pub fn spawn(listener: L, local_identity: Identity, policy: GreetingPolicy) -> SupervisorHandle {
        let local = listener.local_address().clone();
        let (supervisor, control, reports) = Self::new(listener, local_identity, policy);

        SupervisorHandle {
            local,
            control,
            reports,
            task: tokio::spawn(supervisor.run()),
        }
    }

    fn new(
        listener: L,
        local_identity: Identity,
        policy: GreetingPolicy,
    ) -> (
        Self,
        mpsc::UnboundedSender<()>,
        mpsc::UnboundedReceiver<SupervisorReport>,
    ) {
        let (control_tx, control) = mpsc::unbounded_channel();
        let (reports, reports_rx) = mpsc::unbounded_channel();

        let supervisor = Self {
            listener,
            local_identity,
            policy,
            sessions: JoinSet::new(),
            live: HashMap::new(),
            tasks: HashMap::new(),
            next_id: 1,
            control,
            reports,
        };
        (supervisor, control_tx, reports_rx)
    }

    /// Start a session for a freshly accepted stream.
    pub fn on_accept(&mut self, accepted: Accepted) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;

        let peer = accepted.peer.clone();
        tracing::info!("Accepted {} as session {}", peer, id);

        let (session, mailbox) = Session::new(id, accepted, self.local_identity.clone(), self.policy);
        self.start(id, peer.clone(), mailbox, session.run());
        self.report(SupervisorReport::Accepted { id, peer });
        id
    }

    fn start<F>(&mut self, id: SessionId, peer: Address, mailbox: Mailbox, session: F)
    where
        F: Future<Output = SessionEnd> + Send + 'static,
    {
        let task = self.sessions.spawn(session);
        self.tasks.insert(task.id(), (id, peer));
        self.live.insert(id, mailbox);
    }

    async fn run(mut self) -> Outcome {
        let mut paused_until: Option<Instant> = None;

        let outcome = loop {
            tokio::select! {
                _ = self.control.recv() => break Outcome::Aborted,
                accepted = self.listener.accept(), if paused_until.is_none() => match accepted {
                    Ok(accepted) => {
                        self.on_accept(accepted);
                    }
                    Err(TransportError::Accept(e)) => {
                        tracing::warn!("Accept at {} failed: {}", self.listener.local_address(), e);
                        if !is_per_stream(&e) {
                            paused_until = Some(Instant::now() + ACCEPT_BACKOFF);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Listener at {} failed: {}", self.listener.local_address(), e);
                        break Outcome::PeerAbandoned { reason: e.to_string() };
                    }
                },
                _ = tokio::time::sleep_until(paused_until.unwrap_or_else(Instant::now)), if paused_until.is_some() => {
                    paused_until = None;
                }
                Some(joined) = self.sessions.join_next_with_id() => self.reap(joined),
            }
        };

        self.shutdown().await;
        tracing::info!("Supervisor at {} finished: {}", self.listener.local_address(), outcome);
        outcome
    }

    /// Stop every live session and wait for all of them to end.
    async fn shutdown(&mut self) {
        tracing::debug!("Stopping {} sessions", self.live.len());
        for mailbox in self.live.values() {
            let _ = mailbox.send(Event::Stop);
        }
        while let Some(joined) = self.sessions.join_next_with_id().await {
            self.reap(joined);
        }
    }

    fn reap(&mut self, joined: Result<(task::Id, SessionEnd), JoinError>) {
        let (task, end) = match joined {
            Ok(joined) => joined,
            Err(e) => {
                let Some((id, peer)) = self.tasks.get(&e.id()).cloned() else {
                    tracing::error!("Unknown session task failed: {}", e);
                    return;
                };
                tracing::error!("Session {} with {} failed: {}", id, peer, e);
                let end = SessionEnd {
                    id,
                    peer,
                    outcome: Outcome::Aborted,
                    rounds: 0,
                };
                (e.id(), end)
            }
        };

        self.tasks.remove(&task);
        self.live.remove(&end.id);
        if matches!(
            end.outcome,
            Outcome::ProtocolViolation(_) | Outcome::PeerAbandoned { .. }
        ) {
            tracing::warn!("Session {} with {}: {}", end.id, end.peer, end.outcome);
        } else {
            tracing::info!("Session {} with {}: {}", end.id, end.peer, end.outcome);
        }
        self.report(SupervisorReport::SessionEnded(end));
    }

    fn report(&self, report: SupervisorReport) {
        let _ = self.reports.send(report);
    }
}

/// Whether an accept error concerns only the stream being accepted.
fn is_per_stream(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Owner's handle on a running [`Supervisor`].
#[derive(Debug)]
pub struct SupervisorHandle {
    local: Address,
    control: mpsc::UnboundedSender<()>,
    reports: mpsc::UnboundedReceiver<SupervisorReport>,
    task: JoinHandle<Outcome>,
}

impl SupervisorHandle {
    /// The address the listener is bound to.
    pub fn local_address(&self) -> &Address {
        &self.local
    }

    pub async fn next(&mut self) -> Option<SupervisorReport> {
        self.reports.recv().await
    }

    /// Ask the supervisor to stop without waiting.
    pub fn cancel(&self) {
        let _ = self.control.send(());
    }

    /// Stop every session and wait until all of them have ended.
    pub async fn stop(self) -> Outcome {
        self.cancel();
        self.join().await
    }

    pub async fn join(self) -> Outcome {
        let Self { control, task, .. } = self;
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Supervisor task failed: {}", e);
                Outcome::Aborted
            }
        };
        drop(control);
        outcome
    }
}

/// Listen per `settings` and supervise every stream accepted there.
pub async fn listen<T: Transport>(
    transport: &T,
    settings: &ServerSettings,
) -> Result<SupervisorHandle, TransportError> {
    let listener = transport.listen(&settings.address).await?;
    Ok(Supervisor::spawn(
        listener,
        settings.local_identity.clone(),
        settings.greeting_policy,
    ))
}
