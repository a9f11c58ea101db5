use crate::models::ConnectionId;
use std::collections::{BTreeMap, HashMap};

/// FIFO holding area of connections waiting for a partner
///
/// Entries are keyed by a monotonically increasing arrival number, so a scan
/// walks them in arrival order while removal from the middle stays cheap.
#[derive(Debug, Clone, Default)]
pub struct MatchingQueue {
    order: BTreeMap<u64, ConnectionId>,
    positions: HashMap<ConnectionId, u64>,
    next_seq: u64,
}

impl MatchingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. Returns `false` and keeps the existing position if already queued.
    pub fn enqueue(&mut self, id: ConnectionId) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, id);
        self.positions.insert(id, seq);
        true
    }

    pub fn remove(&mut self, id: &ConnectionId) -> bool {
        match self.positions.remove(id) {
            Some(seq) => {
                self.order.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.positions.contains_key(id)
    }

    /// Waiting connections, head to tail
    pub fn iter(&self) -> impl Iterator<Item = &ConnectionId> + '_ {
        self.order.values()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = MatchingQueue::new();
        let ids: Vec<ConnectionId> = (0..4).map(|_| ConnectionId::new()).collect();
        for id in &ids {
            assert!(queue.enqueue(*id));
        }

        let scanned: Vec<ConnectionId> = queue.iter().copied().collect();
        assert_eq!(scanned, ids);
    }

    #[test]
    fn test_enqueue_twice_keeps_position() {
        let mut queue = MatchingQueue::new();
        let first = ConnectionId::new();
        let second = ConnectionId::new();

        queue.enqueue(first);
        queue.enqueue(second);
        assert!(!queue.enqueue(first));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.iter().next(), Some(&first));
    }

    #[test]
    fn test_remove_from_middle() {
        let mut queue = MatchingQueue::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();
        queue.enqueue(a);
        queue.enqueue(b);
        queue.enqueue(c);

        assert!(queue.remove(&b));
        assert!(!queue.remove(&b));
        assert!(!queue.contains(&b));
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![a, c]);
    }

    #[test]
    fn test_requeue_goes_to_tail() {
        let mut queue = MatchingQueue::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        queue.enqueue(a);
        queue.enqueue(b);

        queue.remove(&a);
        queue.enqueue(a);

        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![b, a]);
    }
}
