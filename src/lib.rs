//! Embeddable chain log indexer.
//!
//! Follows a set of contract addresses on one chain, deduplicates and caches
//! their logs, and delivers decoded events to registered handlers in strict
//! `(block, log index)` order across all subscriptions.

#[macro_use]
mod logging;

pub mod abi;
pub mod cache;
pub mod rpc;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod error;
mod fetcher;
mod indexer;
mod processor;
mod queue;
mod reader;
mod subscription;
mod types;

pub use error::{HandlerError, IndexerError};
pub use indexer::{
    Completion, DEFAULT_BLOCK_CONFIRMATIONS, DEFAULT_MAX_BLOCK_RANGE,
    DEFAULT_NOTIFICATION_CAPACITY, DEFAULT_POLL_INTERVAL, EventContext, Indexer, IndexerBuilder,
    IndexerHandle,
};
pub use queue::{EventQueue, PendingEvent};
pub use reader::{ContractReader, ReadRequest};
pub use rpc::{StandardClient, StandardClientBuilder};
pub use subscription::{Subscription, SubscriptionOptions};
pub use types::{Event, IndexerNotification, Progress, ToBlock};
