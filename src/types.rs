use std::mem::discriminant;

use alloy::{dyn_abi::DynSolValue, rpc::types::Log};
use serde::{Deserialize, Serialize};

use crate::IndexerError;

/// Inclusive upper bound of a subscription or an indexing run.
///
/// `Latest` tracks the chain head on every poll; `Block` pins a concrete
/// height after which the subscription (or the whole run, for
/// [`index_to_block`](crate::IndexerHandle::index_to_block)) is complete.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToBlock {
    Latest,
    Block(u64),
}

impl ToBlock {
    /// Clamps `target` to this bound.
    #[must_use]
    pub fn bound(self, target: u64) -> u64 {
        match self {
            ToBlock::Latest => target,
            ToBlock::Block(n) => n.min(target),
        }
    }

    /// Returns the concrete height, if any.
    #[must_use]
    pub fn as_number(self) -> Option<u64> {
        match self {
            ToBlock::Latest => None,
            ToBlock::Block(n) => Some(n),
        }
    }
}

impl Default for ToBlock {
    fn default() -> Self {
        ToBlock::Latest
    }
}

impl From<u64> for ToBlock {
    fn from(value: u64) -> Self {
        ToBlock::Block(value)
    }
}

/// A decoded event as delivered to handlers.
#[derive(Debug, Clone)]
pub struct Event {
    /// Id of the subscription that produced the event.
    pub subscription_id: String,
    /// Name the contract's ABI was registered under.
    pub contract_name: String,
    pub event_name: String,
    /// Decoded arguments in declaration order.
    pub args: Vec<DynSolValue>,
    /// The raw log the event was decoded from.
    pub log: Log,
}

impl Event {
    /// The `"{contract}:{event}"` key this event dispatches under.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.contract_name, self.event_name)
    }

    #[must_use]
    pub fn block_number(&self) -> u64 {
        self.log.block_number.unwrap_or_default()
    }

    #[must_use]
    pub fn log_index(&self) -> u64 {
        self.log.log_index.unwrap_or_default()
    }
}

/// Progress report emitted once per fully caught-up poll tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Highest block every subscription is known indexed up to.
    pub current_block: u64,
    /// The tick's resolved target block.
    pub target_block: u64,
    /// Events still queued beyond the target.
    pub pending_events: usize,
}

/// Lifecycle notifications streamed to listeners registered via
/// [`Indexer::notifications`](crate::Indexer::notifications).
#[derive(Clone, Debug)]
pub enum IndexerNotification {
    /// The engine entered the running state.
    Started,
    /// The engine left the running state, either naturally or via `stop`.
    Stopped,
    /// A poll tick fully caught up with its target.
    Progress(Progress),
    /// A poll tick failed; the engine keeps polling in watch mode.
    Error(IndexerError),
}

impl PartialEq for IndexerNotification {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (IndexerNotification::Progress(a), IndexerNotification::Progress(b)) => a == b,
            // Errors compare by variant only; sources are not comparable.
            (a, b) => discriminant(a) == discriminant(b),
        }
    }
}

impl From<Progress> for IndexerNotification {
    fn from(value: Progress) -> Self {
        IndexerNotification::Progress(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_block_bound_clamps() {
        assert_eq!(ToBlock::Latest.bound(77), 77);
        assert_eq!(ToBlock::Block(50).bound(77), 50);
        assert_eq!(ToBlock::Block(100).bound(77), 77);
    }

    #[test]
    fn to_block_survives_serde() {
        let latest = serde_json::to_string(&ToBlock::Latest).unwrap();
        let pinned = serde_json::to_string(&ToBlock::Block(42)).unwrap();

        assert_eq!(serde_json::from_str::<ToBlock>(&latest).unwrap(), ToBlock::Latest);
        assert_eq!(serde_json::from_str::<ToBlock>(&pinned).unwrap(), ToBlock::Block(42));
    }

    #[test]
    fn notifications_compare_by_variant() {
        let progress = Progress { current_block: 5, target_block: 10, pending_events: 0 };

        assert_eq!(IndexerNotification::Started, IndexerNotification::Started);
        assert_ne!(IndexerNotification::Started, IndexerNotification::Stopped);
        assert_eq!(
            IndexerNotification::Progress(progress),
            IndexerNotification::Progress(progress)
        );
        assert_eq!(
            IndexerNotification::Error(IndexerError::NotRunning),
            IndexerNotification::Error(IndexerError::AlreadyStarted)
        );
    }
}
