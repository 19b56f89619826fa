//! Reconnection groups.
//!
//! A group keeps one connection per named member address. Its control loop
//! is the only writer of the member table: connections, retry timers and
//! stream watchers all report into the loop's mailbox, tagged with the
//! member's generation so that news from a replaced connection is ignored.
//!
//! The owner sees [`GroupStatus`] values: an update whenever a member is
//! gained, acknowledged or lost, `Ready` once every member has completed its
//! handshake, and finally `Completed` when the group gives up or is stopped.

use crate::{Connection, Established, Finished, State};
use handshake_core::{Acknowledgement, Address, ClientSettings, Identity, Outcome, RetryPolicy};
use handshake_net::{Event, Mailbox, Transport, TransportEvent};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What happened to a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberChange {
    /// The member's stream is connected and its greeting is out.
    Gained,
    /// The member's handshake completed with this reply.
    Acknowledged(Acknowledgement),
    /// The member's connection ended or its established stream went away.
    Lost(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupUpdate {
    pub member: String,
    pub change: MemberChange,
}

/// Notification to the group's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupStatus {
    Update(GroupUpdate),
    /// Every member has completed a handshake. Sent at most once.
    Ready,
    /// The group has ended. Always the last status.
    Completed(Outcome),
}

#[derive(Debug)]
enum Control {
    Stop,
}

enum GroupEvent {
    Transition {
        member: String,
        generation: u64,
        state: State,
    },
    Finished {
        member: String,
        generation: u64,
        finished: Finished,
    },
    RetryDue {
        member: String,
        generation: u64,
    },
    Lost {
        member: String,
        generation: u64,
        outcome: Outcome,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberStatus {
    Connecting,
    Connected,
    Established,
    Waiting,
}

struct Member {
    address: Address,
    status: MemberStatus,
    /// Attempts since the last success.
    attempts: u32,
    generation: u64,
    /// Mailbox of the live connection, if any.
    active: Option<Mailbox>,
    watcher: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
}

impl Member {
    fn new(address: Address) -> Self {
        Self {
            address,
            status: MemberStatus::Waiting,
            attempts: 0,
            generation: 0,
            active: None,
            watcher: None,
            retry: None,
        }
    }

    fn cancel_tasks(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }
}

/// Supervisor of a set of outbound connections.
pub struct Group<T: Transport> {
    local_identity: Identity,
    timeout: Duration,
    retry: RetryPolicy,
    transport: T,
    members: BTreeMap<String, Member>,
    ready_sent: bool,
    control: mpsc::UnboundedReceiver<Control>,
    tx: mpsc::UnboundedSender<GroupEvent>,
    rx: mpsc::UnboundedReceiver<GroupEvent>,
    status: mpsc::UnboundedSender<GroupStatus>,
}

impl<T: Transport> Group<T> {
    /// Start connecting to every member.
    pub fn create(
        members: BTreeMap<String, Address>,
        local_identity: Identity,
        timeout: Duration,
        retry: RetryPolicy,
        transport: T,
    ) -> GroupHandle {
        let (control_tx, control) = mpsc::unbounded_channel();
        let (status, status_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::unbounded_channel();

        let group = Self {
            local_identity,
            timeout,
            retry,
            transport,
            members: members
                .into_iter()
                .map(|(key, address)| (key, Member::new(address)))
                .collect(),
            ready_sent: false,
            control,
            tx,
            rx,
            status,
        };

        GroupHandle {
            control: control_tx,
            status: status_rx,
            task: tokio::spawn(group.run()),
        }
    }

    pub fn from_settings(settings: &ClientSettings, transport: T) -> GroupHandle {
        Self::create(
            settings.members.clone(),
            settings.local_identity.clone(),
            settings.handshake_timeout(),
            settings.retry,
            transport,
        )
    }

    async fn run(mut self) -> Outcome {
        let keys: Vec<String> = self.members.keys().cloned().collect();
        tracing::debug!("Group starting with {} members", keys.len());
        for key in &keys {
            self.launch(key);
        }
        // An empty group has nothing to wait for.
        self.check_ready();

        let outcome = loop {
            tokio::select! {
                // An explicit stop, or the owner dropped its handle.
                _ = self.control.recv() => break Outcome::Aborted,
                Some(event) = self.rx.recv() => {
                    if let Some(outcome) = self.on_event(event) {
                        break outcome;
                    }
                }
            }
        };

        self.shutdown().await;
        tracing::info!("Group completed: {}", outcome);
        self.emit(GroupStatus::Completed(outcome.clone()));
        outcome
    }

    /// Handle one event; returns the group outcome if the group is done.
    fn on_event(&mut self, event: GroupEvent) -> Option<Outcome> {
        match event {
            GroupEvent::Transition {
                member,
                generation,
                state,
            } => {
                if state == State::Connected && self.is_current(&member, generation) {
                    self.set_status(&member, MemberStatus::Connected);
                    self.update(&member, MemberChange::Gained);
                }
                None
            }
            GroupEvent::Finished {
                member,
                generation,
                finished,
            } => {
                if !self.is_current(&member, generation) {
                    return None;
                }
                if let Some(m) = self.members.get_mut(&member) {
                    m.active = None;
                }
                match (finished.outcome, finished.established) {
                    (Outcome::Acknowledged(ack), Some(established)) => {
                        self.on_established(&member, generation, ack, established);
                        None
                    }
                    (outcome, _) => self.on_failure(&member, outcome),
                }
            }
            GroupEvent::RetryDue { member, generation } => {
                let due = self.members.get(&member).is_some_and(|m| {
                    m.generation == generation && m.status == MemberStatus::Waiting
                });
                if due {
                    self.launch(&member);
                }
                None
            }
            GroupEvent::Lost {
                member,
                generation,
                outcome,
            } => {
                let established = self.members.get(&member).is_some_and(|m| {
                    m.generation == generation && m.status == MemberStatus::Established
                });
                if established {
                    tracing::info!("Lost established member {}: {}", member, outcome);
                    if let Some(m) = self.members.get_mut(&member) {
                        m.watcher = None;
                        m.attempts = 0;
                    }
                    self.update(&member, MemberChange::Lost(outcome));
                    self.schedule_retry(&member, 1);
                }
                None
            }
        }
    }

    fn on_established(
        &mut self,
        member: &str,
        generation: u64,
        ack: Acknowledgement,
        established: Established,
    ) {
        tracing::info!(
            "Member {} acknowledged by {} at {}",
            member,
            ack.responder_name,
            established.peer
        );
        let watcher = tokio::spawn(watch(
            member.to_string(),
            generation,
            established,
            self.tx.clone(),
        ));

        if let Some(m) = self.members.get_mut(member) {
            m.status = MemberStatus::Established;
            m.attempts = 0;
            m.watcher = Some(watcher);
        }
        self.update(member, MemberChange::Acknowledged(ack));
        self.check_ready();
    }

    /// Emit `Ready` the first time every member is established.
    fn check_ready(&mut self) {
        let all = self
            .members
            .values()
            .all(|m| m.status == MemberStatus::Established);
        if all && !self.ready_sent {
            self.ready_sent = true;
            tracing::info!("Group ready");
            self.emit(GroupStatus::Ready);
        }
    }

    fn on_failure(&mut self, member: &str, outcome: Outcome) -> Option<Outcome> {
        self.update(member, MemberChange::Lost(outcome.clone()));

        if !outcome.is_retryable() {
            tracing::warn!("Member {} failed without retry: {}", member, outcome);
            return Some(outcome);
        }

        let attempts = self.members.get(member).map_or(0, |m| m.attempts);
        if self.retry.is_exhausted(attempts) {
            tracing::warn!(
                "Member {} gave up after {} attempts: {}",
                member,
                attempts,
                outcome
            );
            return Some(outcome);
        }

        self.schedule_retry(member, attempts);
        None
    }

    fn schedule_retry(&mut self, member: &str, failures: u32) {
        let delay = self.retry.delay(failures);
        let tx = self.tx.clone();
        let Some(m) = self.members.get_mut(member) else {
            return;
        };

        m.status = MemberStatus::Waiting;
        let generation = m.generation;
        let key = member.to_string();
        tracing::debug!("Retrying {} in {:?}", member, delay);
        m.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(GroupEvent::RetryDue {
                member: key,
                generation,
            });
        }));
    }

    /// Spawn a fresh connection for `member`.
    fn launch(&mut self, member: &str) {
        let tx = self.tx.clone();
        let Some(m) = self.members.get_mut(member) else {
            return;
        };
        debug_assert!(m.active.is_none(), "member {member} already has a connection");

        m.generation += 1;
        m.attempts += 1;
        m.status = MemberStatus::Connecting;
        m.retry = None;

        let (observer, mut transitions) = mpsc::unbounded_channel();
        let handle = Connection::new(
            member,
            m.address.clone(),
            self.local_identity.clone(),
            self.timeout,
            self.transport.clone(),
        )
        .with_observer(observer)
        .spawn();
        handle.start();
        m.active = Some(handle.control());

        tracing::debug!(
            "Member {} attempt {} to {}",
            member,
            m.attempts,
            m.address
        );

        // Forward transitions ahead of the outcome so the loop sees them in order.
        let key = member.to_string();
        let generation = m.generation;
        tokio::spawn(async move {
            while let Some(t) = transitions.recv().await {
                let _ = tx.send(GroupEvent::Transition {
                    member: key.clone(),
                    generation,
                    state: t.state,
                });
            }
            let finished = handle.join().await;
            let _ = tx.send(GroupEvent::Finished {
                member: key,
                generation,
                finished,
            });
        });
    }

    /// Stop every member and wait until none has a live connection.
    async fn shutdown(&mut self) {
        for m in self.members.values_mut() {
            // Aborting a watcher drops its established stream.
            m.cancel_tasks();
            if let Some(active) = &m.active {
                let _ = active.send(Event::Stop);
            }
        }

        while self.members.values().any(|m| m.active.is_some()) {
            let Some(event) = self.rx.recv().await else {
                break;
            };
            if let GroupEvent::Finished {
                member, generation, ..
            } = event
            {
                if let Some(m) = self.members.get_mut(&member) {
                    if m.generation == generation {
                        m.active = None;
                    }
                }
            }
        }
    }

    fn is_current(&self, member: &str, generation: u64) -> bool {
        self.members
            .get(member)
            .is_some_and(|m| m.generation == generation)
    }

    fn set_status(&mut self, member: &str, status: MemberStatus) {
        if let Some(m) = self.members.get_mut(member) {
            m.status = status;
        }
    }

    fn update(&self, member: &str, change: MemberChange) {
        self.emit(GroupStatus::Update(GroupUpdate {
            member: member.to_string(),
            change,
        }));
    }

    fn emit(&self, status: GroupStatus) {
        let _ = self.status.send(status);
    }
}

/// Watch an established stream and report when it goes away.
async fn watch(
    member: String,
    generation: u64,
    mut established: Established,
    tx: mpsc::UnboundedSender<GroupEvent>,
) {
    let outcome = loop {
        match established.events.recv().await {
            Some(Event::Transport(TransportEvent::Closed)) | None => break Outcome::PeerClosed,
            Some(Event::Transport(TransportEvent::Abandoned { reason })) => {
                break Outcome::PeerAbandoned { reason };
            }
            Some(event) => {
                tracing::debug!("Member {}: ignoring {} on established stream", member, event.tag());
            }
        }
    };
    let _ = tx.send(GroupEvent::Lost {
        member,
        generation,
        outcome,
    });
}

/// Owner's handle on a running [`Group`].
#[derive(Debug)]
pub struct GroupHandle {
    control: mpsc::UnboundedSender<Control>,
    status: mpsc::UnboundedReceiver<GroupStatus>,
    task: JoinHandle<Outcome>,
}

impl GroupHandle {
    /// Next status notification; `None` after `Completed` has been taken.
    pub async fn next(&mut self) -> Option<GroupStatus> {
        self.status.recv().await
    }

    /// Ask the group to stop; `Completed(Aborted)` follows once every
    /// member is terminal.
    pub fn cancel(&self) {
        let _ = self.control.send(Control::Stop);
    }

    /// Stop the group and wait until every member is terminal.
    pub async fn stop(self) -> Outcome {
        self.cancel();
        self.join().await
    }

    /// Wait for the group to end on its own.
    pub async fn join(self) -> Outcome {
        let Self { control, task, .. } = self;
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Group task failed: {}", e);
                Outcome::Aborted
            }
        };
        drop(control);
        outcome
    }
}
