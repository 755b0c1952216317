//! Per-contract subscription cursors.
//!
//! A subscription tracks how far a contract's logs have been fetched onto the
//! queue (`fetched_to_block`) and how far its events have been dispatched
//! (`indexed_to_block`/`indexed_to_log_index`). A `None` cursor means
//! "nothing yet", one block before the subscription's start.

use alloy::primitives::Address;

use crate::types::ToBlock;

/// Options for creating a subscription.
///
/// The id defaults to the checksummed contract address, which makes
/// re-subscribing to the same address idempotent; supply a custom id to keep
/// distinct views of one contract.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    pub id: Option<String>,
    pub contract_name: String,
    pub contract_address: Address,
    pub from_block: u64,
    pub to_block: ToBlock,
}

impl SubscriptionOptions {
    #[must_use]
    pub fn new(contract_name: impl Into<String>, contract_address: Address) -> Self {
        Self {
            id: None,
            contract_name: contract_name.into(),
            contract_address,
            from_block: 0,
            to_block: ToBlock::Latest,
        }
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn from_block(mut self, from_block: u64) -> Self {
        self.from_block = from_block;
        self
    }

    #[must_use]
    pub fn to_block(mut self, to_block: impl Into<ToBlock>) -> Self {
        self.to_block = to_block.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub contract_name: String,
    pub contract_address: Address,
    pub from_block: u64,
    pub to_block: ToBlock,
    /// Highest block whose logs have been placed on the queue.
    pub fetched_to_block: Option<u64>,
    /// Highest block whose events have been fully dispatched.
    pub indexed_to_block: Option<u64>,
    /// Last dispatched log index within `indexed_to_block`.
    pub indexed_to_log_index: u64,
}

impl Subscription {
    #[must_use]
    pub fn new(options: SubscriptionOptions) -> Self {
        let id = options
            .id
            .unwrap_or_else(|| options.contract_address.to_checksum(None));
        Self {
            id,
            contract_name: options.contract_name,
            contract_address: options.contract_address,
            from_block: options.from_block,
            to_block: options.to_block,
            fetched_to_block: None,
            indexed_to_block: options.from_block.checked_sub(1),
            indexed_to_log_index: 0,
        }
    }

    /// The next unfetched range up to `target_block`, honoring `to_block`.
    ///
    /// Returns `None` when the subscription is already fetched up to the
    /// clamped target.
    #[must_use]
    pub fn next_fetch_range(&self, target_block: u64) -> Option<(u64, u64)> {
        let to = self.to_block.bound(target_block);
        let from = match self.fetched_to_block {
            Some(fetched) if fetched >= to => return None,
            Some(fetched) => self.from_block.max(fetched + 1),
            None => self.from_block,
        };
        (from <= to).then_some((from, to))
    }

    /// Whether `(block_number, log_index)` was already dispatched.
    ///
    /// This is the deduplication point for overlapping cache and RPC fetches.
    #[must_use]
    pub fn already_indexed(&self, block_number: u64, log_index: u64) -> bool {
        match self.indexed_to_block {
            Some(indexed) => (block_number, log_index) <= (indexed, self.indexed_to_log_index),
            None => false,
        }
    }

    /// Advances the dispatch cursor past a delivered event.
    pub fn advance_indexed(&mut self, block_number: u64, log_index: u64) {
        self.indexed_to_block = Some(block_number);
        self.indexed_to_log_index = log_index;
    }

    /// Marks the subscription caught up to `target_block`.
    ///
    /// The block cursor is clamped to `to_block` so it never passes a
    /// concrete upper bound, and the log-index cursor resets only when the
    /// block cursor actually advances.
    pub fn mark_caught_up(&mut self, target_block: u64) {
        let bound = self.to_block.bound(target_block);
        if Some(bound) > self.indexed_to_block {
            self.indexed_to_block = Some(bound);
            self.indexed_to_log_index = 0;
        }
    }

    /// A subscription with a concrete `to_block` is complete once indexed
    /// through it; it is never polled afterwards.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self.to_block.as_number() {
            Some(to) => self.indexed_to_block >= Some(to),
            None => false,
        }
    }
}
