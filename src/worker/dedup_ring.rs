//! # Dedup Ring
//!
//! Bounded set of work item keys admitted by this process. A redelivered
//! message for an item that is still buffered or running finds its key here
//! and is acknowledged without a second attempt.
//!
//! The ring only guards one process. Exclusivity across processes comes from
//! the node/pid lease on the work item itself.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Default)]
struct RingState {
    order: VecDeque<String>,
    members: HashSet<String>,
}

#[derive(Debug)]
pub struct DedupRing {
    capacity: usize,
    state: Mutex<RingState>,
}

impl DedupRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(RingState::default()),
        }
    }

    /// Adds `key` unless it is already present. Check and insert happen under
    /// one lock, so of two concurrent callers with the same key exactly one
    /// gets `true`. When full, the oldest key is evicted.
    pub fn try_add(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        if state.members.contains(key) {
            return false;
        }
        if state.order.len() >= self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.members.remove(&oldest);
            }
        }
        state.order.push_back(key.to_string());
        state.members.insert(key.to_string());
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().members.contains(key)
    }

    /// Returns whether the key was present
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        if !state.members.remove(key) {
            return false;
        }
        state.order.retain(|k| k != key);
        true
    }

    /// Snapshot of the keys, oldest first
    pub fn items(&self) -> Vec<String> {
        self.state.lock().order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_add_contains_remove() {
        let ring = DedupRing::new(3);
        assert!(ring.try_add("1"));
        assert!(!ring.try_add("1"));
        assert!(ring.contains("1"));
        assert!(ring.remove("1"));
        assert!(!ring.remove("1"));
        assert!(ring.try_add("1"));
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let ring = DedupRing::new(2);
        ring.try_add("a");
        ring.try_add("b");
        ring.try_add("c");
        assert_eq!(ring.items(), vec!["b".to_string(), "c".to_string()]);
        assert!(!ring.contains("a"));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let ring = Arc::new(DedupRing::new(16));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ring = ring.clone();
                std::thread::spawn(move || ring.try_add("42"))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(ring.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(capacity in 1usize..16, keys in proptest::collection::vec(0u8..32, 0..64)) {
            let ring = DedupRing::new(capacity);
            for key in &keys {
                let key = key.to_string();
                ring.try_add(&key);
                prop_assert!(ring.contains(&key));
                prop_assert!(ring.len() <= capacity);
            }
            let items = ring.items();
            let unique: HashSet<_> = items.iter().collect();
            prop_assert_eq!(unique.len(), items.len());
        }
    }
}
