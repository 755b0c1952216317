//! Per-subscription log-fetch planning.
//!
//! For every subscription that is behind the tick's target, the planner
//! resolves which block ranges to serve from the cache and which to fetch
//! from RPC, then enqueues the resulting logs as pending events. Ordering is
//! the queue's job; the planner only guarantees that a range is either fully
//! enqueued or the whole invocation fails, so the indexer can advance
//! `fetched_to_block` iff the planner returned successfully.

use alloy::rpc::types::{Filter, Log};

use crate::{
    IndexerError, Subscription,
    abi::AbiRegistry,
    cache::{EventCache, LogRangeKey},
    queue::{EventQueue, PendingEvent},
    rpc::{RpcClient, RpcError},
};

pub(crate) struct FetchPlanner<'a> {
    pub(crate) chain_id: u64,
    pub(crate) max_block_range: u64,
    pub(crate) registry: &'a AbiRegistry,
    pub(crate) rpc: &'a dyn RpcClient,
    pub(crate) cache: Option<&'a dyn EventCache>,
}

impl FetchPlanner<'_> {
    /// Fills `queue` with pending events for every subscription whose cursor
    /// is behind `target_block`.
    pub(crate) async fn fetch_subscription_events(
        &self,
        target_block: u64,
        subscriptions: impl Iterator<Item = &Subscription>,
        queue: &mut EventQueue,
    ) -> Result<(), IndexerError> {
        for subscription in subscriptions {
            let Some((from, to)) = subscription.next_fetch_range(target_block) else {
                continue;
            };
            debug!(
                subscription = %subscription.id,
                from_block = from,
                to_block = to,
                "planning log fetch"
            );
            self.fetch_range(subscription, from, to, queue).await?;
        }
        Ok(())
    }

    /// Cache-through fetch of `[from, to]` for one subscription.
    ///
    /// Ranges are pre-split into `max_block_range` chunks, each chunk is
    /// answered from the cache where covered, and provider range-too-wide
    /// refusals bisect the chunk until single blocks succeed. Any other
    /// error aborts the invocation.
    async fn fetch_range(
        &self,
        subscription: &Subscription,
        from: u64,
        to: u64,
        queue: &mut EventQueue,
    ) -> Result<(), IndexerError> {
        let contract = self.registry.get(&subscription.contract_name)?;
        let topic0_hashes = contract.topic0_hashes();

        let mut pending = chunk_ranges(from, to, self.max_block_range);

        while let Some((from, to)) = pending.pop() {
            if let Some(cache) = self.cache {
                let key = self.range_key(subscription, from, to);
                if let Some(hit) = cache.logs(&key).await? {
                    trace!(
                        subscription = %subscription.id,
                        from_block = hit.from_block,
                        to_block = hit.to_block,
                        log_count = hit.logs.len(),
                        "log range served from cache"
                    );
                    self.enqueue(subscription, contract_filtered(&hit.logs, contract), queue);
                    if from < hit.from_block {
                        pending.push((from, hit.from_block - 1));
                    }
                    if hit.to_block < to {
                        pending.push((hit.to_block + 1, to));
                    }
                    continue;
                }
            }

            let filter = Filter::new()
                .address(subscription.contract_address)
                .event_signature(topic0_hashes.clone())
                .from_block(from)
                .to_block(to);

            match self.rpc.get_logs(&filter).await {
                Ok(logs) => {
                    if let Some(cache) = self.cache {
                        cache.insert_logs(&self.range_key(subscription, from, to), &logs).await?;
                    }
                    self.enqueue(subscription, contract_filtered(&logs, contract), queue);
                }
                Err(RpcError::RangeTooWide) if from < to => {
                    let mid = from + (to - from) / 2;
                    debug!(
                        subscription = %subscription.id,
                        from_block = from,
                        to_block = to,
                        mid = mid,
                        "log range too wide, splitting"
                    );
                    pending.push((mid + 1, to));
                    pending.push((from, mid));
                }
                Err(error) => return Err(error.into()),
            }
        }

        Ok(())
    }

    fn range_key(&self, subscription: &Subscription, from: u64, to: u64) -> LogRangeKey {
        LogRangeKey {
            chain_id: self.chain_id,
            address: subscription.contract_address,
            topic0: None,
            from_block: from,
            to_block: to,
        }
    }

    fn enqueue<'l>(
        &self,
        subscription: &Subscription,
        logs: impl Iterator<Item = &'l Log>,
        queue: &mut EventQueue,
    ) {
        for log in logs {
            let (Some(block_number), Some(log_index)) = (log.block_number, log.log_index) else {
                warn!(subscription = %subscription.id, "skipping pending log without block position");
                continue;
            };
            queue.push(PendingEvent {
                block_number,
                log_index,
                subscription_id: subscription.id.clone(),
                contract_name: subscription.contract_name.clone(),
                log: log.clone(),
            });
        }
    }
}

/// Keeps only logs whose topic0 belongs to the contract's declared events.
///
/// The cache is consulted without a topic filter, so cached entries may hold
/// logs the subscription's ABI cannot decode.
fn contract_filtered<'l>(
    logs: &'l [Log],
    contract: &'l crate::abi::ContractAbi,
) -> impl Iterator<Item = &'l Log> {
    logs.iter()
        .filter(|log| log.topic0().is_some_and(|topic0| contract.matches_topic0(topic0)))
}

/// Pre-splits `[from, to]` into inclusive chunks of at most `max_block_range`
/// blocks, as a worklist (popping yields ascending ranges).
fn chunk_ranges(from: u64, to: u64, max_block_range: u64) -> Vec<(u64, u64)> {
    let mut chunks = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(max_block_range - 1).min(to);
        chunks.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    chunks.reverse();
    chunks
}
