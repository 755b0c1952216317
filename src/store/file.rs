//! JSON-file subscription store.
//!
//! One JSON document holding the complete subscription set; writes go
//! through a sibling temp file and an atomic rename so a crash mid-save
//! leaves the previous snapshot intact.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{StoreError, StoredSubscription, SubscriptionStore};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".tmp");
        path.into()
    }
}

#[async_trait]
impl SubscriptionStore for JsonFileStore {
    async fn all(&self) -> Result<Vec<StoredSubscription>, StoreError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            // A store that was never saved is an empty set, not an error.
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(StoreError::new(error)),
        };
        serde_json::from_slice(&contents).map_err(StoreError::new)
    }

    async fn save(&self, subscriptions: &[StoredSubscription]) -> Result<(), StoreError> {
        let contents = serde_json::to_vec_pretty(subscriptions).map_err(StoreError::new)?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, contents).await.map_err(StoreError::new)?;
        tokio::fs::rename(&temp_path, &self.path).await.map_err(StoreError::new)?;
        debug!(count = subscriptions.len(), "persisted subscription snapshot");
        Ok(())
    }
}
