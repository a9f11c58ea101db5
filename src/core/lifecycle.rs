use crate::core::matcher::Matcher;
use crate::core::queue::MatchingQueue;
use crate::core::registry::ConnectionRegistry;
use crate::models::{ConnectionId, ConnectionState, Filter, Profile};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

/// Side effect of a lifecycle step, to be delivered to a connection's mailbox
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Matched {
        to: ConnectionId,
        partner: ConnectionId,
        profile: Profile,
    },
    PartnerDisconnected {
        to: ConnectionId,
        from: ConnectionId,
    },
}

impl Notice {
    pub fn recipient(&self) -> ConnectionId {
        match self {
            Notice::Matched { to, .. } | Notice::PartnerDisconnected { to, .. } => *to,
        }
    }
}

/// Broken queue/registry consistency
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("connection {0} is queued but not waiting")]
    QueuedNotWaiting(ConnectionId),

    #[error("connection {0} is waiting but not queued")]
    WaitingNotQueued(ConnectionId),

    #[error("queue holds unregistered connection {0}")]
    QueuedUnregistered(ConnectionId),

    #[error("connection {id} points at {partner} which does not point back")]
    AsymmetricPairing { id: ConnectionId, partner: ConnectionId },

    #[error("connection {0} state disagrees with its partner relation")]
    PartnerStateMismatch(ConnectionId),
}

/// Snapshot of connection counts per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleStats {
    pub connections: usize,
    pub idle: usize,
    pub waiting: usize,
    pub paired: usize,
    /// Age of the longest-lived connection, 0 when there are none
    pub oldest_connection_secs: u64,
}

/// Per-connection state machine over the shared registry and queue
///
/// Every operation runs to completion before the next one starts and returns
/// the notices it produced, so pairing and queue removal are never observed
/// half-done. The owner is expected to serialize calls (see `services::broker`).
#[derive(Debug, Clone, Default)]
pub struct SessionLifecycle {
    registry: ConnectionRegistry,
    queue: MatchingQueue,
    matcher: Matcher,
}

impl SessionLifecycle {
    pub fn new(matcher: Matcher) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            queue: MatchingQueue::new(),
            matcher,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &MatchingQueue {
        &self.queue
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Transport connected
    pub fn connect(&mut self, id: ConnectionId) -> bool {
        let added = self.registry.register(id);
        if added {
            debug!(connection = %id, "Registered connection");
        }
        added
    }

    /// Remember the profile without touching the queue
    pub fn ready(&mut self, id: &ConnectionId, profile: Profile) {
        if let Some(entry) = self.registry.get_mut(id) {
            entry.profile = Some(profile);
        }
    }

    /// Store profile and filter, then pair or wait
    pub fn find(&mut self, id: &ConnectionId, profile: Profile, filter: Option<Filter>) -> Vec<Notice> {
        let mut notices = Vec::new();
        if !self.registry.contains(id) {
            warn!(connection = %id, "Find request from unregistered connection");
            return notices;
        }

        self.dissolve(id, &mut notices);

        if let Some(entry) = self.registry.get_mut(id) {
            entry.profile = Some(profile);
            entry.filter = filter;
        }

        self.search(id, &mut notices);
        notices
    }

    /// Leave the current partner and look for another with the last known profile/filter
    pub fn next(&mut self, id: &ConnectionId) -> Vec<Notice> {
        let mut notices = Vec::new();
        if !self.registry.contains(id) {
            return notices;
        }

        self.dissolve(id, &mut notices);
        self.search(id, &mut notices);
        notices
    }

    /// Leave the partner or the queue and go Idle. Repeated stops are no-ops.
    pub fn stop(&mut self, id: &ConnectionId) -> Vec<Notice> {
        let mut notices = Vec::new();
        if !self.registry.contains(id) {
            return notices;
        }

        self.dissolve(id, &mut notices);
        self.queue.remove(id);
        self.registry.set_state(id, ConnectionState::Idle);
        debug!(connection = %id, "Stopped");
        notices
    }

    /// Transport closed: drop every trace of the connection. Idempotent.
    pub fn disconnect(&mut self, id: &ConnectionId) -> Vec<Notice> {
        let mut notices = Vec::new();
        if !self.registry.contains(id) {
            return notices;
        }

        self.dissolve(id, &mut notices);
        self.queue.remove(id);
        self.registry.set_state(id, ConnectionState::Closed);
        self.registry.remove(id);
        debug!(connection = %id, "Unregistered connection");
        notices
    }

    pub fn stats(&self) -> LifecycleStats {
        LifecycleStats {
            connections: self.registry.len(),
            idle: self.registry.count(ConnectionState::Idle),
            waiting: self.registry.count(ConnectionState::Waiting),
            paired: self.registry.count(ConnectionState::Paired),
            oldest_connection_secs: self
                .registry
                .oldest_connected_at()
                .map(|since| (Utc::now() - since).num_seconds().max(0) as u64)
                .unwrap_or(0),
        }
    }

    /// Verify queue membership and pairing symmetry for every connection
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for id in self.queue.iter() {
            match self.registry.state(id) {
                None => return Err(InvariantViolation::QueuedUnregistered(*id)),
                Some(ConnectionState::Waiting) => {}
                Some(_) => return Err(InvariantViolation::QueuedNotWaiting(*id)),
            }
        }

        for entry in self.registry.iter() {
            if entry.state == ConnectionState::Waiting && !self.queue.contains(&entry.id) {
                return Err(InvariantViolation::WaitingNotQueued(entry.id));
            }

            match (entry.state, entry.partner) {
                (ConnectionState::Paired, Some(partner)) => {
                    let back = self.registry.get(&partner);
                    let symmetric = back.is_some_and(|other| {
                        other.partner == Some(entry.id) && other.state == ConnectionState::Paired
                    });
                    if !symmetric {
                        return Err(InvariantViolation::AsymmetricPairing { id: entry.id, partner });
                    }
                }
                (ConnectionState::Paired, None) | (_, Some(_)) => {
                    return Err(InvariantViolation::PartnerStateMismatch(entry.id));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Break the pairing `id` is part of, if any, and notify whoever got left behind
    fn dissolve(&mut self, id: &ConnectionId, notices: &mut Vec<Notice>) {
        let Some(unpaired) = self.registry.unpair(id) else {
            return;
        };

        self.registry.set_state(id, ConnectionState::Idle);
        self.partner_lost(unpaired.partner, *id, notices);
        if let Some(orphan) = unpaired.orphan {
            self.partner_lost(orphan, unpaired.partner, notices);
        }
        debug!(connection = %id, partner = %unpaired.partner, "Unpaired");
    }

    fn partner_lost(&mut self, who: ConnectionId, from: ConnectionId, notices: &mut Vec<Notice>) {
        if !self.registry.contains(&who) {
            return;
        }

        self.queue.remove(&who);
        self.registry.set_state(&who, ConnectionState::Idle);
        notices.push(Notice::PartnerDisconnected { to: who, from });
    }

    /// Run the matcher for `id` and apply the result
    fn search(&mut self, id: &ConnectionId, notices: &mut Vec<Notice>) {
        let Some(entry) = self.registry.get(id) else {
            return;
        };
        let profile = entry.profile.clone().unwrap_or_default();
        let filter = entry.filter.clone();

        let found = self
            .matcher
            .find_match(&mut self.queue, &self.registry, id, &profile, filter.as_ref());

        match found {
            Some(partner) => {
                let partner_profile = self
                    .registry
                    .get(&partner)
                    .and_then(|entry| entry.profile.clone())
                    .unwrap_or_default();

                self.registry.pair(*id, partner);
                debug!(connection = %id, partner = %partner, "Paired");

                notices.push(Notice::Matched {
                    to: *id,
                    partner,
                    profile: partner_profile,
                });
                notices.push(Notice::Matched {
                    to: partner,
                    partner: *id,
                    profile,
                });
            }
            None => {
                self.registry.set_state(id, ConnectionState::Waiting);
                debug!(connection = %id, queued = self.queue.len(), "Waiting for a partner");
            }
        }
    }
}
