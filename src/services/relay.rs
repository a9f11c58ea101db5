use crate::models::{ClientEvent, ConnectionId, Profile, ServerEvent};
use crate::services::session::PartnerLink;

/// What happened to a relayed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    /// Sender is not paired
    NoPartner,
    /// Partner's mailbox is closed or the frame came from someone else
    PartnerGone,
    /// Partner has too many frames pending
    PartnerBusy,
    /// Control event, never forwarded
    NotRelayable,
}

/// Forwards negotiation and chat frames between paired connections
///
/// Payloads are never inspected. Nothing here reports failure to the sender;
/// a dropped frame is recovered by the client's own timeout.
pub struct SignalingRelay;

impl SignalingRelay {
    /// Map a participant frame to what the partner receives
    ///
    /// Offers additionally carry the sender's profile so the answering side
    /// learns who is calling. The payload itself is passed through untouched.
    pub fn outbound(event: ClientEvent, sender_profile: Option<&Profile>) -> Option<ServerEvent> {
        match event {
            ClientEvent::NegotiationOffer { payload } => Some(ServerEvent::NegotiationOffer {
                payload,
                profile: sender_profile.cloned(),
            }),
            ClientEvent::NegotiationAnswer { payload } => Some(ServerEvent::NegotiationAnswer { payload }),
            ClientEvent::NetworkCandidate { payload } => Some(ServerEvent::NetworkCandidate { payload }),
            ClientEvent::ChatMessage { text } => Some(ServerEvent::ChatMessage { text }),
            ClientEvent::Ready { .. }
            | ClientEvent::Find { .. }
            | ClientEvent::Next
            | ClientEvent::Stop => None,
        }
    }

    /// Push `event` from `from` into the partner's mailbox
    pub fn relay(
        from: ConnectionId,
        partner: Option<&PartnerLink>,
        sender_profile: Option<&Profile>,
        event: ClientEvent,
    ) -> RelayOutcome {
        let Some(event) = Self::outbound(event, sender_profile) else {
            return RelayOutcome::NotRelayable;
        };
        let Some(partner) = partner else {
            return RelayOutcome::NoPartner;
        };

        partner.mailbox().relay(from, event)
    }

    /// Receiving side: only frames from the current partner get through
    pub fn accepts(current: Option<&PartnerLink>, from: ConnectionId) -> RelayOutcome {
        match current {
            Some(partner) if partner.id() == from => RelayOutcome::Delivered,
            Some(_) => RelayOutcome::PartnerGone,
            None => RelayOutcome::NoPartner,
        }
    }
}
