//! RPC client contract consumed by the engine.
//!
//! The engine only ever talks to a chain through [`RpcClient`]; the bundled
//! [`StandardClient`] wraps an Alloy HTTP provider with retries and a
//! concurrency cap, and test doubles implement the trait directly.

use std::sync::Arc;

use alloy::{
    primitives::{Address, Bytes},
    rpc::types::{Filter, Log},
};
use async_trait::async_trait;
use thiserror::Error;

mod standard;

pub use standard::{
    DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, StandardClient,
    StandardClientBuilder,
};

/// An `eth_call`-style point read at a specific height.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub address: Address,
    /// ABI-encoded calldata, selector included.
    pub data: Bytes,
    pub block_number: u64,
}

/// Errors surfaced by an [`RpcClient`].
///
/// `RangeTooWide` is the distinguished condition the fetch planner recovers
/// from by bisecting the range; everything else propagates to the tick.
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("log range too wide")]
    RangeTooWide,

    #[error("RPC transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl RpcError {
    /// Wraps an arbitrary transport-level error.
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RpcError::Transport(Arc::new(error))
    }

    /// Builds a transport error from a bare message.
    pub fn message(message: impl Into<String>) -> Self {
        let boxed: Box<dyn std::error::Error + Send + Sync> = message.into().into();
        RpcError::Transport(Arc::from(boxed))
    }
}

/// The chain-facing operations the engine needs.
///
/// Implementations are expected to signal provider-side refusals of oversized
/// `get_logs` ranges as [`RpcError::RangeTooWide`] and to never retry that
/// condition; the planner handles it by splitting the range.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Current chain head height.
    async fn get_last_block_number(&self) -> Result<u64, RpcError>;

    /// Logs matching `filter`. The filter's address may be a single address
    /// or a set; each topic position may be empty, a single hash, or a
    /// disjunction.
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError>;

    /// Executes a read-only contract call at `call.block_number`.
    async fn read_contract(&self, call: &CallRequest) -> Result<Bytes, RpcError>;
}
