use crate::core::filters::is_compatible;
use crate::core::queue::MatchingQueue;
use crate::core::registry::ConnectionRegistry;
use crate::models::{ConnectionId, Filter, MatchPolicy, Profile};

/// Pairing algorithm over the waiting queue
///
/// # Selection
/// 1. Walk the queue head to tail, skipping the requester itself
/// 2. Keep candidates the requester's filter accepts
/// 3. Under [`MatchPolicy::Mutual`], also require the candidate's own filter to accept the requester
/// 4. First survivor wins, so among equally eligible candidates the longest waiting one is picked
#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher {
    policy: MatchPolicy,
}

impl Matcher {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Find the earliest eligible waiting candidate without modifying the queue
    pub fn select(
        &self,
        queue: &MatchingQueue,
        registry: &ConnectionRegistry,
        requester: &ConnectionId,
        profile: &Profile,
        filter: Option<&Filter>,
    ) -> Option<ConnectionId> {
        queue
            .iter()
            .filter(|candidate| *candidate != requester)
            .find(|candidate| {
                // Queue entries without a registry entry are never eligible
                registry.get(candidate).is_some_and(|entry| {
                    let empty = Profile::default();
                    is_compatible(
                        self.policy,
                        profile,
                        filter,
                        entry.profile.as_ref().unwrap_or(&empty),
                        entry.filter.as_ref(),
                    )
                })
            })
            .copied()
    }

    /// Scan for a partner and take it off the queue
    ///
    /// On a hit the candidate (and the requester, if it was waiting) leaves the queue
    /// and the candidate is returned. On a miss the requester is appended to the tail,
    /// or keeps its place if already queued.
    pub fn find_match(
        &self,
        queue: &mut MatchingQueue,
        registry: &ConnectionRegistry,
        requester: &ConnectionId,
        profile: &Profile,
        filter: Option<&Filter>,
    ) -> Option<ConnectionId> {
        match self.select(queue, registry, requester, profile, filter) {
            Some(candidate) => {
                queue.remove(&candidate);
                queue.remove(requester);
                Some(candidate)
            }
            None => {
                queue.enqueue(*requester);
                None
            }
        }
    }
}
