//! The standard HTTP transport: an Alloy provider wrapped with retries and a
//! concurrency cap.

use std::{sync::Arc, time::Duration};

use alloy::{
    eips::BlockId,
    primitives::{Bytes, TxKind},
    providers::{Provider, RootProvider},
    rpc::types::{Filter, Log, TransactionInput, TransactionRequest},
    transports::{RpcError as TransportError, TransportErrorKind, http::reqwest::Url},
};
use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use tokio::sync::Semaphore;

use super::{CallRequest, RpcClient, RpcError};

/// Upper bound on concurrently in-flight RPC calls.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 5;

/// How many times a transient failure is retried before it surfaces.
pub const DEFAULT_MAX_RETRIES: usize = 5;

/// Pause between retry attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Provider error fragments that mean "the requested log range is too wide",
/// matched case-insensitively. Extend via
/// [`StandardClientBuilder::range_too_wide_pattern`].
const RANGE_TOO_WIDE_PATTERNS: &[&str] = &[
    "query returned more than",
    "log response size exceeded",
    "block range is too wide",
    "exceed maximum block range",
];

fn message_indicates_range_too_wide(message: &str, extra_patterns: &[String]) -> bool {
    let message = message.to_lowercase();
    RANGE_TOO_WIDE_PATTERNS.iter().any(|pattern| message.contains(pattern))
        || extra_patterns.iter().any(|pattern| message.contains(pattern.as_str()))
}

/// [`RpcClient`] over an Alloy [`RootProvider`].
///
/// Transient failures are retried with a constant backoff; range-too-wide
/// refusals are classified from the provider's error message, never retried,
/// and surfaced as [`RpcError::RangeTooWide`] so the fetch planner can split
/// the range. A semaphore caps fan-out across everything the engine issues
/// concurrently.
#[derive(Clone)]
pub struct StandardClient {
    provider: RootProvider,
    permits: Arc<Semaphore>,
    max_retries: usize,
    retry_delay: Duration,
    extra_patterns: Arc<[String]>,
}

/// Builder for [`StandardClient`].
#[derive(Debug, Clone)]
pub struct StandardClientBuilder {
    max_concurrent_requests: usize,
    max_retries: usize,
    retry_delay: Duration,
    extra_patterns: Vec<String>,
}

impl Default for StandardClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            extra_patterns: Vec::new(),
        }
    }

    #[must_use]
    pub fn max_concurrent_requests(mut self, max_concurrent_requests: usize) -> Self {
        self.max_concurrent_requests = max_concurrent_requests;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Adds a provider-specific error-message fragment to treat as
    /// range-too-wide.
    #[must_use]
    pub fn range_too_wide_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.extra_patterns.push(pattern.into().to_lowercase());
        self
    }

    /// Connects to an HTTP JSON-RPC endpoint.
    #[must_use]
    pub fn connect_http(self, url: Url) -> StandardClient {
        self.connect(RootProvider::new_http(url))
    }

    /// Wraps an existing provider.
    #[must_use]
    pub fn connect(self, provider: RootProvider) -> StandardClient {
        StandardClient {
            provider,
            permits: Arc::new(Semaphore::new(self.max_concurrent_requests)),
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            extra_patterns: self.extra_patterns.into(),
        }
    }
}

impl StandardClient {
    fn is_range_too_wide(&self, error: &TransportError<TransportErrorKind>) -> bool {
        let message = error
            .as_error_resp()
            .map_or_else(|| error.to_string(), |payload| payload.message.to_string());
        message_indicates_range_too_wide(&message, &self.extra_patterns)
    }

    fn classify(&self, error: TransportError<TransportErrorKind>) -> RpcError {
        if self.is_range_too_wide(&error) {
            RpcError::RangeTooWide
        } else {
            RpcError::Transport(Arc::new(error))
        }
    }

    /// Runs `operation` under the concurrency cap with constant-backoff
    /// retries. Range-too-wide responses are not retried.
    async fn with_retries<T, F, Fut>(&self, operation: F) -> Result<T, RpcError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, TransportError<TransportErrorKind>>>,
    {
        // Held across retries so a flapping endpoint cannot multiply fan-out.
        let _permit =
            self.permits.acquire().await.expect("client owns the semaphore, never closed");

        let strategy = ConstantBuilder::default()
            .with_delay(self.retry_delay)
            .with_max_times(self.max_retries);

        operation
            .retry(strategy)
            .when(|error: &TransportError<TransportErrorKind>| !self.is_range_too_wide(error))
            .notify(|error: &TransportError<TransportErrorKind>, after: Duration| {
                info!(error = %error, "transient RPC error, retrying after {:?}", after);
            })
            .sleep(tokio::time::sleep)
            .await
            .map_err(|error| self.classify(error))
    }
}

#[async_trait]
impl RpcClient for StandardClient {
    async fn get_last_block_number(&self) -> Result<u64, RpcError> {
        trace!("eth_blockNumber");
        let result = self.with_retries(|| async { self.provider.get_block_number().await }).await;
        if let Err(error) = &result {
            error!(error = %error, "eth_blockNumber failed");
        }
        result
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        trace!("eth_getLogs");
        let result = self.with_retries(|| async { self.provider.get_logs(filter).await }).await;
        if let Err(error) = &result
            && !matches!(error, RpcError::RangeTooWide)
        {
            error!(error = %error, "eth_getLogs failed");
        }
        result
    }

    async fn read_contract(&self, call: &CallRequest) -> Result<Bytes, RpcError> {
        trace!(block_number = call.block_number, "eth_call");
        let request = TransactionRequest {
            to: Some(TxKind::Call(call.address)),
            input: TransactionInput::new(call.data.clone()),
            ..Default::default()
        };
        let result = self
            .with_retries(|| async {
                self.provider
                    .call(request.clone())
                    .block(BlockId::number(call.block_number))
                    .await
            })
            .await;
        if let Err(error) = &result {
            error!(error = %error, "eth_call failed");
        }
        result
    }
}
