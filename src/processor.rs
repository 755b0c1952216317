//! Ordered event dispatch.
//!
//! Drains the queue up to the tick's target block in strict
//! `(block, log index, subscription id)` order, decoding and handing each
//! event to the registered handlers. Dispatch is the deduplication point:
//! anything at or below a subscription's indexed cursor is dropped, so
//! overlapping cache and RPC fetches stay invisible to handlers.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::{
    IndexerError, Subscription,
    abi::AbiRegistry,
    indexer::HandlerRegistry,
    queue::EventQueue,
    reader::ContractReader,
    subscription::SubscriptionOptions,
    types::Event,
};

/// Cross-subscription watermark: the lowest `(indexed_to_block,
/// indexed_to_log_index)` over all subscriptions. `None` block means a
/// subscription has not indexed anything yet.
pub(crate) type Watermark = (Option<u64>, u64);

pub(crate) struct ProcessOutcome {
    /// Watermark over all subscriptions after the drain. Reporting only;
    /// per-subscription cursors are advanced in place and never rewound.
    pub(crate) watermark: Watermark,
    /// Whether a handler registered at least one new subscription; the
    /// indexer must re-enter the fetch planner immediately.
    pub(crate) has_new_subscriptions: bool,
}

pub(crate) struct EventProcessor<'a> {
    pub(crate) registry: &'a AbiRegistry,
    pub(crate) handlers: &'a HandlerRegistry,
    pub(crate) reader: &'a ContractReader,
    pub(crate) subscribe_tx: &'a mpsc::UnboundedSender<SubscriptionOptions>,
    pub(crate) subscribe_rx: &'a mut mpsc::UnboundedReceiver<SubscriptionOptions>,
}

impl EventProcessor<'_> {
    /// Drains events with `block_number <= target_block`.
    ///
    /// Stops early when a handler adds a subscription, leaving the remaining
    /// events queued; they re-sort against the new subscription's events on
    /// the immediate re-poll.
    pub(crate) async fn process_events(
        &mut self,
        queue: &mut EventQueue,
        target_block: u64,
        subscriptions: &mut BTreeMap<String, Subscription>,
    ) -> Result<ProcessOutcome, IndexerError> {
        // Requests that raced in outside a drain (e.g. after an aborted
        // tick): insert them and replan before dispatching anything else.
        let mut has_new_subscriptions = self.insert_requested(subscriptions);

        while !has_new_subscriptions
            && let Some(pending) = queue.take_if(|event| event.block_number <= target_block)
        {
            let Some(subscription) = subscriptions.get(&pending.subscription_id) else {
                trace!(
                    subscription = %pending.subscription_id,
                    "dropping event for removed subscription"
                );
                continue;
            };
            if subscription.already_indexed(pending.block_number, pending.log_index) {
                trace!(
                    subscription = %pending.subscription_id,
                    block_number = pending.block_number,
                    log_index = pending.log_index,
                    "skipping already-indexed event"
                );
                continue;
            }

            let contract = self.registry.get(&pending.contract_name)?;
            let (event_name, args) = match contract.decode_log(&pending.log) {
                Ok(decoded) => decoded,
                Err(error) => {
                    warn!(
                        subscription = %pending.subscription_id,
                        block_number = pending.block_number,
                        log_index = pending.log_index,
                        error = %error,
                        "failed to decode log, skipping event"
                    );
                    continue;
                }
            };

            let event = Event {
                subscription_id: pending.subscription_id.clone(),
                contract_name: pending.contract_name,
                event_name,
                args,
                log: pending.log,
            };
            self.handlers.dispatch(&event, self.reader, self.subscribe_tx).await?;

            if let Some(subscription) = subscriptions.get_mut(&pending.subscription_id) {
                subscription.advance_indexed(pending.block_number, pending.log_index);
            }

            has_new_subscriptions = self.insert_requested(subscriptions);
            if has_new_subscriptions {
                debug!("subscription added mid-batch, stopping drain to replan");
            }
        }

        Ok(ProcessOutcome { watermark: watermark(subscriptions), has_new_subscriptions })
    }

    /// Moves handler-requested subscriptions into the live map. Returns
    /// whether anything was inserted.
    fn insert_requested(&mut self, subscriptions: &mut BTreeMap<String, Subscription>) -> bool {
        let mut inserted = false;
        // Options were validated against the registry at the handler's call
        // site.
        while let Ok(options) = self.subscribe_rx.try_recv() {
            let subscription = Subscription::new(options);
            info!(
                subscription = %subscription.id,
                contract = %subscription.contract_name,
                "subscription registered mid-batch"
            );
            subscriptions.insert(subscription.id.clone(), subscription);
            inserted = true;
        }
        inserted
    }
}

fn watermark(subscriptions: &BTreeMap<String, Subscription>) -> Watermark {
    subscriptions
        .values()
        .map(|s| (s.indexed_to_block, s.indexed_to_log_index))
        .min()
        .unwrap_or((None, 0))
}
