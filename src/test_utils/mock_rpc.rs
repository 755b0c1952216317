//! Programmable RPC double.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use alloy::{
    primitives::{Address, Bytes},
    rpc::types::{Filter, FilterBlockOption, Log},
};
use async_trait::async_trait;

use crate::rpc::{CallRequest, RpcClient, RpcError};

#[derive(Debug, Default)]
struct MockRpcState {
    head: u64,
    logs: Vec<Log>,
    /// Ranges wider than this many blocks answer range-too-wide.
    max_range: Option<u64>,
    calls: HashMap<(Address, u64, Bytes), Bytes>,
    log_requests: Vec<(u64, u64)>,
}

/// In-process [`RpcClient`] with canned responses and request recording.
///
/// `get_logs` filters the canned log set by range, address, and topic0,
/// mirroring what a real provider would return; ranges wider than the
/// configured limit are refused with [`RpcError::RangeTooWide`]. Clones
/// share state, so a test can keep a handle for mutating canned data after
/// handing the client to the engine.
#[derive(Debug, Clone, Default)]
pub struct MockRpc {
    state: Arc<Mutex<MockRpcState>>,
}

impl MockRpc {
    #[must_use]
    pub fn new(head: u64) -> Self {
        let rpc = Self::default();
        rpc.set_head(head);
        rpc
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MockRpcState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    pub fn set_head(&self, head: u64) {
        self.with_state(|state| state.head = head);
    }

    pub fn push_log(&self, log: Log) {
        self.with_state(|state| state.logs.push(log));
    }

    /// Makes `get_logs` refuse ranges spanning more than `width` blocks.
    pub fn reject_ranges_wider_than(&self, width: u64) {
        self.with_state(|state| state.max_range = Some(width));
    }

    /// Cans an `eth_call` result for exact calldata at a block.
    pub fn set_call_result(&self, address: Address, block_number: u64, data: Bytes, result: Bytes) {
        self.with_state(|state| state.calls.insert((address, block_number, data), result));
    }

    pub fn clear_call_results(&self) {
        self.with_state(|state| state.calls.clear());
    }

    /// Every `(from, to)` range `get_logs` was asked for, in request order.
    #[must_use]
    pub fn log_requests(&self) -> Vec<(u64, u64)> {
        self.with_state(|state| state.log_requests.clone())
    }
}

#[async_trait]
impl RpcClient for MockRpc {
    async fn get_last_block_number(&self) -> Result<u64, RpcError> {
        Ok(self.with_state(|state| state.head))
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        self.with_state(|state| {
            let (from, to) = match &filter.block_option {
                FilterBlockOption::Range { from_block, to_block } => {
                    let from = (*from_block).and_then(|b| b.as_number()).unwrap_or(0);
                    let to = (*to_block).and_then(|b| b.as_number()).unwrap_or(state.head);
                    (from, to)
                }
                FilterBlockOption::AtBlockHash(_) => {
                    return Err(RpcError::message("block-hash filters are not supported"));
                }
            };
            state.log_requests.push((from, to));

            if let Some(max_range) = state.max_range
                && to - from + 1 > max_range
            {
                return Err(RpcError::RangeTooWide);
            }

            let mut logs: Vec<Log> = state
                .logs
                .iter()
                .filter(|log| {
                    log.block_number.is_some_and(|block| (from..=to).contains(&block))
                        && filter.address.matches(&log.address())
                        && log.topic0().is_some_and(|topic0| filter.topics[0].matches(topic0))
                })
                .cloned()
                .collect();
            logs.sort_by_key(|log| (log.block_number, log.log_index));
            Ok(logs)
        })
    }

    async fn read_contract(&self, call: &CallRequest) -> Result<Bytes, RpcError> {
        self.with_state(|state| {
            state
                .calls
                .get(&(call.address, call.block_number, call.data.clone()))
                .cloned()
                .ok_or_else(|| RpcError::message("no canned eth_call result"))
        })
    }
}
