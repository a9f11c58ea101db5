use crate::core::{InvariantViolation, LifecycleStats, Matcher, Notice, SessionLifecycle};
use crate::models::{ConnectionId, ConnectionState, Filter, Profile};
use crate::services::session::{Mailbox, PartnerLink, SessionSignal};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace};

/// Errors talking to the broker task
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker is not running")]
    Unavailable,
}

impl<T> From<mpsc::error::SendError<T>> for BrokerError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        BrokerError::Unavailable
    }
}

impl From<oneshot::error::RecvError> for BrokerError {
    fn from(_: oneshot::error::RecvError) -> Self {
        BrokerError::Unavailable
    }
}

/// Registry view of a single connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub partner: Option<ConnectionId>,
    pub queued: bool,
}

/// Requests accepted by the broker task
#[derive(Debug)]
pub enum BrokerCommand {
    Connect {
        id: ConnectionId,
        mailbox: Mailbox,
        reply: oneshot::Sender<bool>,
    },
    Ready {
        id: ConnectionId,
        profile: Profile,
        reply: oneshot::Sender<()>,
    },
    Find {
        id: ConnectionId,
        epoch: u64,
        profile: Profile,
        filter: Option<Filter>,
        reply: oneshot::Sender<()>,
    },
    Next {
        id: ConnectionId,
        epoch: u64,
        reply: oneshot::Sender<()>,
    },
    Stop {
        id: ConnectionId,
        epoch: u64,
        reply: oneshot::Sender<()>,
    },
    Disconnect {
        id: ConnectionId,
        reply: oneshot::Sender<()>,
    },
    Inspect {
        id: ConnectionId,
        reply: oneshot::Sender<Option<ConnectionSnapshot>>,
    },
    Stats {
        reply: oneshot::Sender<LifecycleStats>,
    },
    CheckInvariants {
        reply: oneshot::Sender<Result<(), InvariantViolation>>,
    },
}

/// Where notices for one connection go, and the latest control epoch it sent
#[derive(Debug)]
struct Endpoint {
    mailbox: Mailbox,
    epoch: u64,
}

/// Single task owning the registry, the waiting queue and the matcher
///
/// Every queue or registry mutation goes through this task's command loop, which
/// is what keeps two concurrent find requests from claiming the same candidate.
pub struct Broker {
    lifecycle: SessionLifecycle,
    endpoints: HashMap<ConnectionId, Endpoint>,
    commands: mpsc::Receiver<BrokerCommand>,
}

impl Broker {
    pub fn new(matcher: Matcher, commands: mpsc::Receiver<BrokerCommand>) -> Self {
        Self {
            lifecycle: SessionLifecycle::new(matcher),
            endpoints: HashMap::new(),
            commands,
        }
    }

    /// Start the broker on the current runtime and return a handle to it
    pub fn spawn(matcher: Matcher, buffer: usize) -> BrokerHandle {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        tokio::spawn(Broker::new(matcher, rx).run());
        BrokerHandle { commands: tx }
    }

    /// Process commands until every handle is dropped
    pub async fn run(mut self) {
        info!(policy = ?self.lifecycle.matcher().policy(), "Broker started");
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        info!("Broker stopped");
    }

    fn handle(&mut self, command: BrokerCommand) {
        match command {
            BrokerCommand::Connect { id, mailbox, reply } => {
                let added = self.lifecycle.connect(id);
                if added {
                    self.endpoints.insert(id, Endpoint { mailbox, epoch: 0 });
                }
                let _ = reply.send(added);
            }
            BrokerCommand::Ready { id, profile, reply } => {
                self.lifecycle.ready(&id, profile);
                let _ = reply.send(());
            }
            BrokerCommand::Find { id, epoch, profile, filter, reply } => {
                self.advance_epoch(&id, epoch);
                let notices = self.lifecycle.find(&id, profile, filter);
                self.deliver(notices);
                let _ = reply.send(());
            }
            BrokerCommand::Next { id, epoch, reply } => {
                self.advance_epoch(&id, epoch);
                let notices = self.lifecycle.next(&id);
                self.deliver(notices);
                let _ = reply.send(());
            }
            BrokerCommand::Stop { id, epoch, reply } => {
                self.advance_epoch(&id, epoch);
                let notices = self.lifecycle.stop(&id);
                self.deliver(notices);
                let _ = reply.send(());
            }
            BrokerCommand::Disconnect { id, reply } => {
                let notices = self.lifecycle.disconnect(&id);
                self.endpoints.remove(&id);
                self.deliver(notices);
                let _ = reply.send(());
            }
            BrokerCommand::Inspect { id, reply } => {
                let snapshot = self.lifecycle.registry().get(&id).map(|entry| ConnectionSnapshot {
                    state: entry.state,
                    partner: entry.partner,
                    queued: self.lifecycle.queue().contains(&id),
                });
                let _ = reply.send(snapshot);
            }
            BrokerCommand::Stats { reply } => {
                let _ = reply.send(self.lifecycle.stats());
            }
            BrokerCommand::CheckInvariants { reply } => {
                let _ = reply.send(self.lifecycle.check_invariants());
            }
        }
    }

    fn advance_epoch(&mut self, id: &ConnectionId, epoch: u64) {
        if let Some(endpoint) = self.endpoints.get_mut(id) {
            endpoint.epoch = endpoint.epoch.max(epoch);
        }
    }

    /// Push notices into mailboxes before the next command is looked at
    fn deliver(&self, notices: Vec<Notice>) {
        for notice in notices {
            let recipient = notice.recipient();
            let Some(endpoint) = self.endpoints.get(&recipient) else {
                debug!(connection = %recipient, "No mailbox for notice recipient");
                continue;
            };

            let signal = match notice {
                Notice::Matched { partner, profile, .. } => {
                    let Some(partner_endpoint) = self.endpoints.get(&partner) else {
                        error!(connection = %recipient, partner = %partner, "Paired with a connection that has no mailbox");
                        continue;
                    };
                    SessionSignal::Matched {
                        partner: PartnerLink::new(partner, partner_endpoint.mailbox.clone()),
                        profile,
                        epoch: endpoint.epoch,
                    }
                }
                Notice::PartnerDisconnected { from, .. } => SessionSignal::PartnerDisconnected { from },
            };

            if !endpoint.mailbox.notify(signal) {
                trace!(connection = %recipient, "Mailbox closed, session is shutting down");
            }
        }
    }
}

/// Cloneable front end used by session workers and HTTP handlers
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    commands: mpsc::Sender<BrokerCommand>,
}

impl BrokerHandle {
    pub fn new(commands: mpsc::Sender<BrokerCommand>) -> Self {
        Self { commands }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> BrokerCommand,
    ) -> Result<T, BrokerError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).await?;
        Ok(response.await?)
    }

    /// Register a connection and its mailbox. Returns `false` for a duplicate id.
    pub async fn connect(&self, id: ConnectionId, mailbox: Mailbox) -> Result<bool, BrokerError> {
        self.request(|reply| BrokerCommand::Connect { id, mailbox, reply }).await
    }

    pub async fn ready(&self, id: ConnectionId, profile: Profile) -> Result<(), BrokerError> {
        self.request(|reply| BrokerCommand::Ready { id, profile, reply }).await
    }

    /// `epoch` is the caller's control counter; matches stamped with an older one are stale
    pub async fn find(
        &self,
        id: ConnectionId,
        epoch: u64,
        profile: Profile,
        filter: Option<Filter>,
    ) -> Result<(), BrokerError> {
        self.request(|reply| BrokerCommand::Find { id, epoch, profile, filter, reply }).await
    }

    pub async fn next(&self, id: ConnectionId, epoch: u64) -> Result<(), BrokerError> {
        self.request(|reply| BrokerCommand::Next { id, epoch, reply }).await
    }

    pub async fn stop(&self, id: ConnectionId, epoch: u64) -> Result<(), BrokerError> {
        self.request(|reply| BrokerCommand::Stop { id, epoch, reply }).await
    }

    pub async fn disconnect(&self, id: ConnectionId) -> Result<(), BrokerError> {
        self.request(|reply| BrokerCommand::Disconnect { id, reply }).await
    }

    pub async fn inspect(&self, id: ConnectionId) -> Result<Option<ConnectionSnapshot>, BrokerError> {
        self.request(|reply| BrokerCommand::Inspect { id, reply }).await
    }

    pub async fn stats(&self) -> Result<LifecycleStats, BrokerError> {
        self.request(|reply| BrokerCommand::Stats { reply }).await
    }

    pub async fn check_invariants(&self) -> Result<Result<(), InvariantViolation>, BrokerError> {
        self.request(|reply| BrokerCommand::CheckInvariants { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected(handle: &BrokerHandle) -> (ConnectionId, mpsc::UnboundedReceiver<SessionSignal>) {
        let id = ConnectionId::new();
        let (tx, rx) = Mailbox::channel(16);
        assert!(handle.connect(id, tx).await.unwrap());
        (id, rx)
    }

    #[tokio::test]
    async fn test_matched_signal_carries_partner_link() {
        let handle = Broker::spawn(Matcher::default(), 16);
        let (x, mut x_rx) = connected(&handle).await;
        let (y, mut y_rx) = connected(&handle).await;

        handle.find(x, 1, Profile::new("female", "US"), None).await.unwrap();
        handle.find(y, 1, Profile::new("male", "US"), None).await.unwrap();

        match x_rx.try_recv().unwrap() {
            SessionSignal::Matched { partner, profile, .. } => {
                assert_eq!(partner.id(), y);
                assert_eq!(profile.gender.as_deref(), Some("male"));
            }
            other => panic!("unexpected signal {:?}", other),
        }
        match y_rx.try_recv().unwrap() {
            SessionSignal::Matched { partner, .. } => assert_eq!(partner.id(), x),
            other => panic!("unexpected signal {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_matched_stamped_with_recipient_epoch() {
        let handle = Broker::spawn(Matcher::default(), 16);
        let (x, mut x_rx) = connected(&handle).await;
        let (y, _y_rx) = connected(&handle).await;

        handle.find(x, 1, Profile::default(), None).await.unwrap();
        handle.next(x, 3).await.unwrap();
        handle.find(y, 1, Profile::default(), None).await.unwrap();

        match x_rx.try_recv().unwrap() {
            SessionSignal::Matched { partner, epoch, .. } => {
                assert_eq!(partner.id(), y);
                assert_eq!(epoch, 3);
            }
            other => panic!("unexpected signal {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_connect_rejected() {
        let handle = Broker::spawn(Matcher::default(), 16);
        let (x, _rx) = connected(&handle).await;
        let (tx, _rx2) = Mailbox::channel(16);

        assert!(!handle.connect(x, tx).await.unwrap());
    }

    #[tokio::test]
    async fn test_stats_reflect_states() {
        let handle = Broker::spawn(Matcher::default(), 16);
        let (a, _a_rx) = connected(&handle).await;
        let (b, _b_rx) = connected(&handle).await;
        let (c, _c_rx) = connected(&handle).await;
        let (_idle, _idle_rx) = connected(&handle).await;

        handle.find(a, 1, Profile::default(), None).await.unwrap();
        handle.find(b, 1, Profile::default(), None).await.unwrap();
        handle.find(c, 1, Profile::default(), None).await.unwrap();

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.connections, 4);
        assert_eq!(stats.paired, 2);
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.idle, 1);
    }

    #[tokio::test]
    async fn test_handle_fails_when_broker_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = BrokerHandle::new(tx);

        assert!(matches!(handle.stats().await, Err(BrokerError::Unavailable)));
    }
}
