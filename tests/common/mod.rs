#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, U256};
use event_indexer::{
    Event, Indexer, IndexerBuilder,
    test_utils::{MockRpc, erc20_abi, transfer_log},
};

pub const CHAIN_ID: u64 = 1;
pub const TOKEN: Address = Address::repeat_byte(0xaa);
pub const OTHER_TOKEN: Address = Address::repeat_byte(0xbb);

pub type EventSink = Arc<Mutex<Vec<Event>>>;

/// An indexer over the ERC-20 fixture ABI with a generic handler that
/// records every dispatched event.
pub fn collecting_indexer(rpc: MockRpc) -> (Indexer, EventSink) {
    let mut indexer = IndexerBuilder::new(CHAIN_ID)
        .contract("Token", erc20_abi())
        .connect(rpc)
        .expect("valid configuration");
    let events = record_events(&mut indexer);
    (indexer, events)
}

/// Attaches a generic recording handler to any indexer.
pub fn record_events(indexer: &mut Indexer) -> EventSink {
    let events: EventSink = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    indexer.on_event(move |ctx| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(ctx.event);
            Ok(())
        }
    });
    events
}

/// The `(block, log index)` positions of recorded events, in dispatch order.
pub fn positions(events: &EventSink) -> Vec<(u64, u64)> {
    events.lock().unwrap().iter().map(|e| (e.block_number(), e.log_index())).collect()
}

/// The `(subscription id, block, log index)` triples of recorded events.
pub fn traced_positions(events: &EventSink) -> Vec<(String, u64, u64)> {
    events
        .lock()
        .unwrap()
        .iter()
        .map(|e| (e.subscription_id.clone(), e.block_number(), e.log_index()))
        .collect()
}

/// A `Transfer` log with a value encoding its position, for easy asserts.
pub fn transfer_at(address: Address, block: u64, log_index: u64) -> alloy::rpc::types::Log {
    transfer_log(
        address,
        block,
        log_index,
        Address::repeat_byte(0x01),
        Address::repeat_byte(0x02),
        U256::from(block * 1000 + log_index),
    )
}
