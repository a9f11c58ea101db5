use crate::models::{ConnectionId, ConnectionState, Filter, Profile};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Bookkeeping for one live connection
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub profile: Option<Profile>,
    pub filter: Option<Filter>,
    pub partner: Option<ConnectionId>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionEntry {
    fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: ConnectionState::Idle,
            profile: None,
            filter: None,
            partner: None,
            connected_at: Utc::now(),
        }
    }
}

/// Outcome of dissolving a pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unpaired {
    pub partner: ConnectionId,
    /// Third connection that lost its partner while repairing a broken back-reference
    pub orphan: Option<ConnectionId>,
}

/// Live connections indexed by id
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection in state Idle. Returns `false` if the id is already known.
    pub fn register(&mut self, id: ConnectionId) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, ConnectionEntry::new(id));
        true
    }

    /// Drop the entry. Callers are responsible for queue membership and the partner side.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionEntry> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&ConnectionEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut ConnectionEntry> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn state(&self, id: &ConnectionId) -> Option<ConnectionState> {
        self.entries.get(id).map(|entry| entry.state)
    }

    pub fn partner(&self, id: &ConnectionId) -> Option<ConnectionId> {
        self.entries.get(id).and_then(|entry| entry.partner)
    }

    pub fn set_state(&mut self, id: &ConnectionId, state: ConnectionState) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.state = state;
        }
    }

    /// Link two connections and mark both Paired
    pub fn pair(&mut self, a: ConnectionId, b: ConnectionId) {
        if let Some(entry) = self.entries.get_mut(&a) {
            entry.partner = Some(b);
            entry.state = ConnectionState::Paired;
        }
        if let Some(entry) = self.entries.get_mut(&b) {
            entry.partner = Some(a);
            entry.state = ConnectionState::Paired;
        }
    }

    /// Clear the partner relation on both sides
    ///
    /// States are left to the caller. A partner whose back-reference points
    /// elsewhere is forcibly cleared as well, along with whatever it pointed to.
    pub fn unpair(&mut self, id: &ConnectionId) -> Option<Unpaired> {
        let partner = self.entries.get_mut(id)?.partner.take()?;

        let Some(other) = self.entries.get_mut(&partner) else {
            tracing::error!(
                connection = %id,
                partner = %partner,
                "Partner relation points at an unregistered connection, clearing"
            );
            return Some(Unpaired { partner, orphan: None });
        };

        match other.partner.take() {
            Some(back) if back == *id => Some(Unpaired { partner, orphan: None }),
            back => {
                tracing::error!(
                    connection = %id,
                    partner = %partner,
                    back_reference = ?back,
                    "Asymmetric pairing detected, forcing both sides apart"
                );

                let mut orphan = None;
                if let Some(third) = back {
                    if let Some(entry) = self.entries.get_mut(&third) {
                        if entry.partner == Some(partner) {
                            entry.partner = None;
                            orphan = Some(third);
                        }
                    }
                }

                Some(Unpaired { partner, orphan })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, state: ConnectionState) -> usize {
        self.entries.values().filter(|entry| entry.state == state).count()
    }

    /// Connect time of the longest-lived connection
    pub fn oldest_connected_at(&self) -> Option<DateTime<Utc>> {
        self.entries.values().map(|entry| entry.connected_at).min()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionEntry> + '_ {
        self.entries.values()
    }
}
