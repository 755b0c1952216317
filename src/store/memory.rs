//! Process-local subscription store, mainly for tests and ephemeral runs.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{StoreError, StoredSubscription, SubscriptionStore};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    subscriptions: Mutex<Vec<StoredSubscription>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with an initial set, as if saved by a previous run.
    #[must_use]
    pub fn with_subscriptions(subscriptions: Vec<StoredSubscription>) -> Self {
        Self { subscriptions: Mutex::new(subscriptions) }
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn all(&self) -> Result<Vec<StoredSubscription>, StoreError> {
        let subscriptions =
            self.subscriptions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(subscriptions.clone())
    }

    async fn save(&self, subscriptions: &[StoredSubscription]) -> Result<(), StoreError> {
        let mut stored =
            self.subscriptions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *stored = subscriptions.to_vec();
        Ok(())
    }
}
