//! Cache-through contract reads.

use std::sync::Arc;

use alloy::{dyn_abi::DynSolValue, primitives::Address};

use crate::{
    IndexerError,
    abi::AbiRegistry,
    cache::{CallKey, EventCache},
    rpc::{CallRequest, RpcClient},
};

/// A read-only contract call against a registered ABI.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// Name the contract's ABI was registered under.
    pub contract: String,
    pub function: String,
    pub address: Address,
    pub block_number: u64,
    pub args: Vec<DynSolValue>,
}

/// Idempotent `eth_call` path shared by the public handle and event-handler
/// contexts.
///
/// Reads encode against the registry, consult the cache, fall back to RPC,
/// and populate the cache on success; the cache is never written on failure.
/// The whole path touches no engine state, so it is safe to call from
/// anywhere, including from inside handlers while a tick is in flight.
#[derive(Clone)]
pub struct ContractReader {
    chain_id: u64,
    registry: Arc<AbiRegistry>,
    rpc: Arc<dyn RpcClient>,
    cache: Option<Arc<dyn EventCache>>,
}

impl ContractReader {
    pub(crate) fn new(
        chain_id: u64,
        registry: Arc<AbiRegistry>,
        rpc: Arc<dyn RpcClient>,
        cache: Option<Arc<dyn EventCache>>,
    ) -> Self {
        Self { chain_id, registry, rpc, cache }
    }

    pub(crate) fn registry(&self) -> &AbiRegistry {
        &self.registry
    }

    /// Executes the read and decodes the return values.
    pub async fn read(&self, request: ReadRequest) -> Result<Vec<DynSolValue>, IndexerError> {
        let contract = self.registry.get(&request.contract)?;
        let data = contract.encode_call(&request.function, &request.args)?;

        let key = CallKey {
            chain_id: self.chain_id,
            address: request.address,
            function: request.function.clone(),
            block_number: request.block_number,
            data: data.clone().into(),
        };

        if let Some(cache) = &self.cache
            && let Some(result) = cache.call_result(&key).await?
        {
            trace!(function = %request.function, block_number = request.block_number, "call served from cache");
            return contract.decode_return(&request.function, &result);
        }

        let call = CallRequest {
            address: request.address,
            data: data.into(),
            block_number: request.block_number,
        };
        let result = self.rpc.read_contract(&call).await?;

        if let Some(cache) = &self.cache {
            cache.insert_call_result(&key, &result).await?;
        }

        contract.decode_return(&request.function, &result)
    }
}
