//! Cache contract: range-keyed log storage plus call-result storage.
//!
//! The engine treats the cache as best effort but never swallows its errors;
//! any failure propagates to the running tick. A lookup may answer with a
//! *covered sub-range* of the request, in which case the caller still owes
//! fetches for the uncovered flanks.

use std::sync::Arc;

use alloy::{
    primitives::{Address, B256, Bytes},
    rpc::types::Log,
};
use async_trait::async_trait;
use thiserror::Error;

mod memory;

pub use memory::InMemoryCache;

/// Error from a cache backend.
#[derive(Error, Debug, Clone)]
#[error("cache backend error: {0}")]
pub struct CacheError(Arc<dyn std::error::Error + Send + Sync>);

impl CacheError {
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self(Arc::from(error.into()))
    }
}

/// Key of a stored log range.
///
/// `topic0` is part of the key so backends may shard by event kind; the
/// engine always consults the cache with `topic0 = None` and filters
/// client-side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogRangeKey {
    pub chain_id: u64,
    pub address: Address,
    pub topic0: Option<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

/// Key of a stored contract-call result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub chain_id: u64,
    pub address: Address,
    pub function: String,
    pub block_number: u64,
    /// ABI-encoded calldata, selector included.
    pub data: Bytes,
}

/// A cache answer covering `[from_block, to_block]` of the requested range,
/// with `request.from_block <= from_block <= to_block <= request.to_block`.
/// The caller still needs `[request.from_block, from_block - 1]` and
/// `[to_block + 1, request.to_block]`.
#[derive(Debug, Clone)]
pub struct CachedRange {
    pub from_block: u64,
    pub to_block: u64,
    pub logs: Vec<Log>,
}

/// Storage backend for fetched logs and contract-call results.
#[async_trait]
pub trait EventCache: Send + Sync {
    /// Looks up logs for `key`'s range; `None` is a miss, `Some` a full or
    /// partial hit per [`CachedRange`].
    async fn logs(&self, key: &LogRangeKey) -> Result<Option<CachedRange>, CacheError>;

    /// Records `logs` as the complete result for exactly `key`'s range.
    async fn insert_logs(&self, key: &LogRangeKey, logs: &[Log]) -> Result<(), CacheError>;

    /// Looks up a stored call result.
    async fn call_result(&self, key: &CallKey) -> Result<Option<Bytes>, CacheError>;

    /// Records a call result.
    async fn insert_call_result(&self, key: &CallKey, result: &Bytes) -> Result<(), CacheError>;
}

#[async_trait]
impl<T: EventCache + ?Sized> EventCache for Arc<T> {
    async fn logs(&self, key: &LogRangeKey) -> Result<Option<CachedRange>, CacheError> {
        (**self).logs(key).await
    }

    async fn insert_logs(&self, key: &LogRangeKey, logs: &[Log]) -> Result<(), CacheError> {
        (**self).insert_logs(key, logs).await
    }

    async fn call_result(&self, key: &CallKey) -> Result<Option<Bytes>, CacheError> {
        (**self).call_result(key).await
    }

    async fn insert_call_result(&self, key: &CallKey, result: &Bytes) -> Result<(), CacheError> {
        (**self).insert_call_result(key, result).await
    }
}
