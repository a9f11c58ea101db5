use crate::models::{ClientEvent, ConnectionId, Profile, ServerEvent};
use crate::services::broker::{BrokerError, BrokerHandle};
use crate::services::relay::{RelayOutcome, SignalingRelay};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

/// Relayed frames a connection may have pending before its partner's frames are dropped
pub const DEFAULT_RELAY_BUFFER: usize = 256;

/// Message delivered to a connection's mailbox
#[derive(Debug)]
pub enum SessionSignal {
    /// `epoch` is the recipient's control epoch the broker had seen when pairing
    Matched {
        partner: PartnerLink,
        profile: Profile,
        epoch: u64,
    },
    PartnerDisconnected {
        from: ConnectionId,
    },
    /// Holds one unit of the recipient's relay budget until consumed
    Relayed {
        from: ConnectionId,
        event: ServerEvent,
        permit: OwnedSemaphorePermit,
    },
}

/// Sending half of a connection's inbox
///
/// Broker notices and relayed frames share one FIFO channel, so `Matched` is
/// always read before the new partner's first frame. Broker notices are never
/// refused; relayed frames draw on a fixed budget and are dropped once it runs out.
#[derive(Debug, Clone)]
pub struct Mailbox {
    sender: mpsc::UnboundedSender<SessionSignal>,
    relay_budget: Arc<Semaphore>,
}

impl Mailbox {
    pub fn channel(relay_buffer: usize) -> (Self, mpsc::UnboundedReceiver<SessionSignal>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mailbox = Self {
            sender,
            relay_budget: Arc::new(Semaphore::new(relay_buffer.max(1))),
        };
        (mailbox, receiver)
    }

    /// Post a broker notice. Returns `false` once the session is gone.
    pub(crate) fn notify(&self, signal: SessionSignal) -> bool {
        self.sender.send(signal).is_ok()
    }

    /// Post a frame from `from` if the relay budget allows it
    pub(crate) fn relay(&self, from: ConnectionId, event: ServerEvent) -> RelayOutcome {
        let Ok(permit) = self.relay_budget.clone().try_acquire_owned() else {
            return RelayOutcome::PartnerBusy;
        };

        match self.sender.send(SessionSignal::Relayed { from, event, permit }) {
            Ok(()) => RelayOutcome::Delivered,
            Err(_) => RelayOutcome::PartnerGone,
        }
    }
}

/// Direct line to the current partner's mailbox
#[derive(Debug, Clone)]
pub struct PartnerLink {
    id: ConnectionId,
    mailbox: Mailbox,
}

impl PartnerLink {
    pub fn new(id: ConnectionId, mailbox: Mailbox) -> Self {
        Self { id, mailbox }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }
}

/// Per-connection worker state
///
/// Control events (find/next/stop) go to the broker; negotiation and chat
/// frames go straight to the partner's mailbox without touching the broker.
/// Every control event bumps the local epoch, so a `Matched` the broker produced
/// before that event is recognised as stale when it is finally read.
pub struct ClientSession {
    id: ConnectionId,
    broker: BrokerHandle,
    partner: Option<PartnerLink>,
    profile: Option<Profile>,
    epoch: u64,
}

impl ClientSession {
    /// Register a fresh connection with the broker
    pub async fn open(
        broker: BrokerHandle,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionSignal>), BrokerError> {
        Self::open_with_relay_buffer(broker, DEFAULT_RELAY_BUFFER).await
    }

    pub async fn open_with_relay_buffer(
        broker: BrokerHandle,
        relay_buffer: usize,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionSignal>), BrokerError> {
        let id = ConnectionId::new();
        let (mailbox, signals) = Mailbox::channel(relay_buffer);
        broker.connect(id, mailbox).await?;

        let session = Self {
            id,
            broker,
            partner: None,
            profile: None,
            epoch: 0,
        };
        Ok((session, signals))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn partner(&self) -> Option<ConnectionId> {
        self.partner.as_ref().map(PartnerLink::id)
    }

    /// Leave the current partner locally and start a new control epoch
    fn begin_control(&mut self) -> u64 {
        self.partner = None;
        self.epoch += 1;
        self.epoch
    }

    /// Apply a frame received from the participant
    pub async fn handle_client_event(&mut self, event: ClientEvent) -> Result<(), BrokerError> {
        match event {
            ClientEvent::Ready { profile } => {
                self.profile = Some(profile.clone());
                self.broker.ready(self.id, profile).await
            }
            ClientEvent::Find { profile, filter } => {
                let epoch = self.begin_control();
                self.profile = Some(profile.clone());
                self.broker.find(self.id, epoch, profile, filter).await
            }
            ClientEvent::Next => {
                let epoch = self.begin_control();
                self.broker.next(self.id, epoch).await
            }
            ClientEvent::Stop => {
                let epoch = self.begin_control();
                self.broker.stop(self.id, epoch).await
            }
            relayed => {
                let outcome = SignalingRelay::relay(
                    self.id,
                    self.partner.as_ref(),
                    self.profile.as_ref(),
                    relayed,
                );
                trace!(connection = %self.id, ?outcome, "Relay");
                Ok(())
            }
        }
    }

    /// Turn a mailbox signal into the frame to push to the participant, if any
    pub fn handle_signal(&mut self, signal: SessionSignal) -> Option<ServerEvent> {
        match signal {
            SessionSignal::Matched { partner, profile, epoch } => {
                if epoch < self.epoch {
                    debug!(connection = %self.id, partner = %partner.id(), "Discarding match superseded by a later request");
                    return None;
                }
                debug!(connection = %self.id, partner = %partner.id(), "Matched");
                self.partner = Some(partner);
                Some(ServerEvent::Matched { profile })
            }
            SessionSignal::PartnerDisconnected { from } => {
                if self.partner() != Some(from) {
                    // Already walked away from this partner locally
                    trace!(connection = %self.id, from = %from, "Ignoring stale partner loss");
                    return None;
                }
                debug!(connection = %self.id, partner = %from, "Partner disconnected");
                self.partner = None;
                Some(ServerEvent::PartnerDisconnected)
            }
            SessionSignal::Relayed { from, event, .. } => {
                if SignalingRelay::accepts(self.partner.as_ref(), from) == RelayOutcome::Delivered {
                    Some(event)
                } else {
                    trace!(connection = %self.id, from = %from, "Dropping frame from former partner");
                    None
                }
            }
        }
    }

    /// Unregister from the broker. Safe to call after the broker already dropped us.
    pub async fn close(self) -> Result<(), BrokerError> {
        self.broker.disconnect(self.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Matcher;
    use crate::models::ConnectionState;
    use crate::services::broker::Broker;

    #[tokio::test]
    async fn test_paired_sessions_exchange_chat() {
        let broker = Broker::spawn(Matcher::default(), 16);
        let (mut x, mut x_rx) = ClientSession::open(broker.clone()).await.unwrap();
        let (mut y, mut y_rx) = ClientSession::open(broker.clone()).await.unwrap();

        x.handle_client_event(ClientEvent::Find { profile: Profile::new("female", "US"), filter: None })
            .await
            .unwrap();
        y.handle_client_event(ClientEvent::Find { profile: Profile::new("male", "US"), filter: None })
            .await
            .unwrap();

        let matched = x.handle_signal(x_rx.recv().await.unwrap());
        assert!(matches!(matched, Some(ServerEvent::Matched { .. })));
        y.handle_signal(y_rx.recv().await.unwrap());
        assert_eq!(x.partner(), Some(y.id()));

        x.handle_client_event(ClientEvent::ChatMessage { text: "hi".to_string() })
            .await
            .unwrap();

        let relayed = y.handle_signal(y_rx.recv().await.unwrap());
        assert_eq!(relayed, Some(ServerEvent::ChatMessage { text: "hi".to_string() }));
    }

    #[tokio::test]
    async fn test_chat_without_partner_is_dropped() {
        let broker = Broker::spawn(Matcher::default(), 16);
        let (mut x, _x_rx) = ClientSession::open(broker.clone()).await.unwrap();

        let result = x
            .handle_client_event(ClientEvent::ChatMessage { text: "anyone?".to_string() })
            .await;

        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn test_partner_loss_after_local_next_is_not_surfaced() {
        let broker = Broker::spawn(Matcher::default(), 16);
        let (mut x, _x_rx) = ClientSession::open(broker.clone()).await.unwrap();
        let stranger = ConnectionId::new();

        let event = x.handle_signal(SessionSignal::PartnerDisconnected { from: stranger });

        assert_eq!(event, None);
    }

    #[tokio::test]
    async fn test_match_queued_before_stop_is_discarded() {
        let broker = Broker::spawn(Matcher::default(), 16);
        let (mut x, _x_rx) = ClientSession::open(broker.clone()).await.unwrap();
        let (mut y, mut y_rx) = ClientSession::open(broker.clone()).await.unwrap();

        y.handle_client_event(ClientEvent::Find { profile: Profile::new("female", "US"), filter: None })
            .await
            .unwrap();
        x.handle_client_event(ClientEvent::Find { profile: Profile::new("male", "US"), filter: None })
            .await
            .unwrap();

        // y stops before reading the match the broker already posted
        y.handle_client_event(ClientEvent::Stop).await.unwrap();

        let pending = y_rx.try_recv().unwrap();
        assert_eq!(y.handle_signal(pending), None);
        assert_eq!(y.partner(), None);

        let snapshot = broker.inspect(y.id()).await.unwrap().unwrap();
        assert_eq!(snapshot.state, ConnectionState::Idle);
        assert_eq!(snapshot.partner, None);
    }

    #[tokio::test]
    async fn test_match_after_latest_request_is_surfaced() {
        let broker = Broker::spawn(Matcher::default(), 16);
        let (mut x, mut x_rx) = ClientSession::open(broker.clone()).await.unwrap();
        let (mut y, _y_rx) = ClientSession::open(broker.clone()).await.unwrap();

        x.handle_client_event(ClientEvent::Find { profile: Profile::default(), filter: None })
            .await
            .unwrap();
        x.handle_client_event(ClientEvent::Next).await.unwrap();
        y.handle_client_event(ClientEvent::Find { profile: Profile::default(), filter: None })
            .await
            .unwrap();

        let matched = x.handle_signal(x_rx.try_recv().unwrap());
        assert!(matches!(matched, Some(ServerEvent::Matched { .. })));
        assert_eq!(x.partner(), Some(y.id()));
    }

    #[test]
    fn test_relay_budget_refuses_excess_frames() {
        let (mailbox, mut signals) = Mailbox::channel(2);
        let from = ConnectionId::new();
        let chat = |text: &str| ServerEvent::ChatMessage { text: text.to_string() };

        assert_eq!(mailbox.relay(from, chat("one")), RelayOutcome::Delivered);
        assert_eq!(mailbox.relay(from, chat("two")), RelayOutcome::Delivered);
        assert_eq!(mailbox.relay(from, chat("three")), RelayOutcome::PartnerBusy);

        // Broker notices still go through with the budget exhausted
        assert!(mailbox.notify(SessionSignal::PartnerDisconnected { from }));

        // Consuming a frame frees its slot
        drop(signals.try_recv().unwrap());
        assert_eq!(mailbox.relay(from, chat("four")), RelayOutcome::Delivered);
    }
}
