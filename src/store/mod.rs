//! Durable subscription-cursor storage.
//!
//! Only cursors survive restarts; event payloads are replayed by re-fetching
//! through the cache. `save` overwrites the complete stored set.
//! `fetched_to_block` is intentionally not persisted: it restarts at
//! "nothing fetched" so the next poll re-plans from the durable cursor.

use std::{str::FromStr, sync::Arc};

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{IndexerError, Subscription, ToBlock, subscription::SubscriptionOptions};

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;

/// Error from a subscription-store backend.
#[derive(Error, Debug, Clone)]
#[error("subscription store error: {0}")]
pub struct StoreError(Arc<dyn std::error::Error + Send + Sync>);

impl StoreError {
    pub fn new<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self(Arc::from(error.into()))
    }
}

/// Serde snapshot of a subscription's durable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSubscription {
    pub id: String,
    pub contract_name: String,
    pub contract_address: String,
    pub from_block: u64,
    pub to_block: ToBlock,
    pub indexed_to_block: Option<u64>,
    pub indexed_to_log_index: u64,
}

impl From<&Subscription> for StoredSubscription {
    fn from(subscription: &Subscription) -> Self {
        Self {
            id: subscription.id.clone(),
            contract_name: subscription.contract_name.clone(),
            contract_address: subscription.contract_address.to_checksum(None),
            from_block: subscription.from_block,
            to_block: subscription.to_block,
            indexed_to_block: subscription.indexed_to_block,
            indexed_to_log_index: subscription.indexed_to_log_index,
        }
    }
}

impl StoredSubscription {
    /// Rebuilds the live subscription; `fetched_to_block` restarts at `None`.
    pub fn into_subscription(self) -> Result<Subscription, IndexerError> {
        let address = Address::from_str(&self.contract_address)
            .map_err(|_| IndexerError::InvalidAddress(self.contract_address.clone()))?;

        let mut subscription = Subscription::new(
            SubscriptionOptions::new(self.contract_name, address)
                .id(self.id)
                .from_block(self.from_block)
                .to_block(self.to_block),
        );
        subscription.indexed_to_block = self.indexed_to_block;
        subscription.indexed_to_log_index = self.indexed_to_log_index;
        Ok(subscription)
    }
}

/// Durable storage for the subscription set.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Loads the complete stored set.
    async fn all(&self) -> Result<Vec<StoredSubscription>, StoreError>;

    /// Overwrites the stored set with `subscriptions`.
    async fn save(&self, subscriptions: &[StoredSubscription]) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: SubscriptionStore + ?Sized> SubscriptionStore for Arc<T> {
    async fn all(&self) -> Result<Vec<StoredSubscription>, StoreError> {
        (**self).all().await
    }

    async fn save(&self, subscriptions: &[StoredSubscription]) -> Result<(), StoreError> {
        (**self).save(subscriptions).await
    }
}
