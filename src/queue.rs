//! Cross-subscription ordering queue.
//!
//! Pending events from every subscription land here before dispatch; the
//! processor drains them in ascending `(block, log index, subscription id)`
//! order, which is what turns per-subscription fetches into one totally
//! ordered stream. The queue does not deduplicate: overlapping cache and
//! RPC fetches may enqueue the same log twice and the processor skips
//! already-indexed positions.

use std::{cmp::Ordering, collections::BinaryHeap};

use alloy::rpc::types::Log;

/// An undecoded log waiting for ordered dispatch.
///
/// Decoding is deferred until the processor takes the event, so a fetch that
/// outruns dispatch never pays for decoding work that a later tick repeats.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub block_number: u64,
    pub log_index: u64,
    pub subscription_id: String,
    pub contract_name: String,
    pub log: Log,
}

impl PendingEvent {
    fn ordering_key(&self) -> (u64, u64, &str) {
        (self.block_number, self.log_index, &self.subscription_id)
    }
}

// Equality and ordering track the ordering key only; the payload is opaque.
impl PartialEq for PendingEvent {
    fn eq(&self, other: &Self) -> bool {
        self.ordering_key() == other.ordering_key()
    }
}

impl Eq for PendingEvent {}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordering_key().cmp(&other.ordering_key())
    }
}

/// Min-heap of pending events keyed by `(block, log index, subscription id)`.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<std::cmp::Reverse<PendingEvent>>,
}

impl EventQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an event. O(log n).
    pub fn push(&mut self, event: PendingEvent) {
        self.heap.push(std::cmp::Reverse(event));
    }

    /// The smallest pending event, if any, without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&PendingEvent> {
        self.heap.peek().map(|entry| &entry.0)
    }

    /// Removes and returns the smallest pending event.
    pub fn take(&mut self) -> Option<PendingEvent> {
        self.heap.pop().map(|entry| entry.0)
    }

    /// Removes and returns the smallest pending event if it satisfies `pred`.
    pub fn take_if(&mut self, pred: impl FnOnce(&PendingEvent) -> bool) -> Option<PendingEvent> {
        if pred(self.peek()?) { self.take() } else { None }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::Address;

    use super::*;
    use crate::test_utils::mock_log;

    fn pending(block: u64, log_index: u64, subscription_id: &str) -> PendingEvent {
        PendingEvent {
            block_number: block,
            log_index,
            subscription_id: subscription_id.to_owned(),
            contract_name: "Token".to_owned(),
            log: mock_log(Address::ZERO, block, log_index),
        }
    }

    #[test]
    fn drains_in_block_then_log_index_order() {
        let mut queue = EventQueue::new();
        queue.push(pending(20, 1, "a"));
        queue.push(pending(10, 0, "a"));
        queue.push(pending(20, 0, "a"));

        let order: Vec<_> =
            std::iter::from_fn(|| queue.take()).map(|e| (e.block_number, e.log_index)).collect();
        assert_eq!(order, vec![(10, 0), (20, 0), (20, 1)]);
    }

    #[test]
    fn ties_break_by_ascending_subscription_id() {
        let mut queue = EventQueue::new();
        queue.push(pending(10, 0, "b"));
        queue.push(pending(10, 0, "a"));
        queue.push(pending(10, 0, "c"));

        let order: Vec<_> =
            std::iter::from_fn(|| queue.take()).map(|e| e.subscription_id).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn peek_leaves_the_queue_intact() {
        let mut queue = EventQueue::new();
        queue.push(pending(5, 0, "a"));

        assert_eq!(queue.peek().map(|e| e.block_number), Some(5));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn take_if_respects_the_predicate() {
        let mut queue = EventQueue::new();
        queue.push(pending(50, 0, "a"));

        assert!(queue.take_if(|e| e.block_number <= 40).is_none());
        assert!(queue.take_if(|e| e.block_number <= 50).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn duplicates_are_kept() {
        let mut queue = EventQueue::new();
        queue.push(pending(10, 0, "a"));
        queue.push(pending(10, 0, "a"));

        assert_eq!(queue.len(), 2);
    }
}
