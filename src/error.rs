use std::sync::Arc;

use thiserror::Error;

use crate::{cache::CacheError, rpc::RpcError, store::StoreError};

/// Error type produced by user event handlers.
///
/// Handlers report failures as boxed errors; the engine wraps them into
/// [`IndexerError::Handler`] and aborts the running tick.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug, Clone)]
pub enum IndexerError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown contract {0:?}")]
    UnknownContract(String),

    #[error("unknown event {event:?} on contract {contract:?}")]
    UnknownEvent { contract: String, event: String },

    #[error("unknown function {function:?} on contract {contract:?}")]
    UnknownFunction { contract: String, function: String },

    #[error("invalid handler key {0:?}, expected \"Contract:Event\"")]
    InvalidHandlerKey(String),

    #[error("invalid contract address {0:?}")]
    InvalidAddress(String),

    #[error("ABI codec error: {0}")]
    Abi(Arc<alloy::dyn_abi::Error>),

    #[error("event handler failed: {0}")]
    Handler(Arc<dyn std::error::Error + Send + Sync>),

    #[error("indexer already started")]
    AlreadyStarted,

    #[error("indexer is not running")]
    NotRunning,

    #[error("poll interval must be greater than 0")]
    InvalidPollInterval,

    #[error("max block range must be greater than 0")]
    InvalidMaxBlockRange,

    #[error("indexer service shut down")]
    ServiceShutdown,
}

impl IndexerError {
    pub(crate) fn abi(error: alloy::dyn_abi::Error) -> Self {
        IndexerError::Abi(Arc::new(error))
    }

    pub(crate) fn handler(error: HandlerError) -> Self {
        IndexerError::Handler(Arc::from(error))
    }
}
