//! In-memory cache backend.
//!
//! Logs are stored per `(chain, address, topic0)` scope as a set of merged
//! coverage intervals over a `(block, log index)`-keyed map. A lookup
//! answers with the first coverage interval overlapping the request, clipped
//! to it: the covered-sub-range shape the fetch planner recurses on.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use alloy::{
    primitives::{Address, B256, Bytes},
    rpc::types::Log,
};
use async_trait::async_trait;

use super::{CacheError, CachedRange, CallKey, EventCache, LogRangeKey};

type Scope = (u64, Address, Option<B256>);

#[derive(Debug, Default)]
struct LogScope {
    /// Sorted, disjoint, non-adjacent inclusive block intervals known to be
    /// fully fetched.
    covered: Vec<(u64, u64)>,
    logs: BTreeMap<(u64, u64), Log>,
}

impl LogScope {
    fn lookup(&self, from_block: u64, to_block: u64) -> Option<CachedRange> {
        let (start, end) = self
            .covered
            .iter()
            .find(|(start, end)| *start <= to_block && *end >= from_block)
            .copied()?;

        let from = start.max(from_block);
        let to = end.min(to_block);
        let logs = self.logs.range((from, 0)..=(to, u64::MAX)).map(|(_, log)| log.clone());

        Some(CachedRange { from_block: from, to_block: to, logs: logs.collect() })
    }

    fn insert(&mut self, from_block: u64, to_block: u64, logs: &[Log]) {
        for log in logs {
            let (Some(block_number), Some(log_index)) = (log.block_number, log.log_index) else {
                debug!("ignoring pending log without block number or log index");
                continue;
            };
            self.logs.insert((block_number, log_index), log.clone());
        }

        self.covered.push((from_block, to_block));
        self.covered.sort_unstable();

        // Re-merge overlapping or adjacent intervals.
        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(self.covered.len());
        for (start, end) in self.covered.drain(..) {
            match merged.last_mut() {
                Some((_, last_end)) if start <= last_end.saturating_add(1) => {
                    *last_end = (*last_end).max(end);
                }
                _ => merged.push((start, end)),
            }
        }
        self.covered = merged;
    }
}

#[derive(Debug, Default)]
struct Inner {
    log_scopes: HashMap<Scope, LogScope>,
    calls: HashMap<CallKey, Bytes>,
}

/// Process-local [`EventCache`] backend.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    inner: Mutex<Inner>,
}

impl InMemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        // Poisoning cannot corrupt this data; recover the guard.
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut inner)
    }
}

#[async_trait]
impl EventCache for InMemoryCache {
    async fn logs(&self, key: &LogRangeKey) -> Result<Option<CachedRange>, CacheError> {
        let scope = (key.chain_id, key.address, key.topic0);
        Ok(self.with_inner(|inner| {
            inner.log_scopes.get(&scope).and_then(|s| s.lookup(key.from_block, key.to_block))
        }))
    }

    async fn insert_logs(&self, key: &LogRangeKey, logs: &[Log]) -> Result<(), CacheError> {
        let scope = (key.chain_id, key.address, key.topic0);
        self.with_inner(|inner| {
            inner
                .log_scopes
                .entry(scope)
                .or_default()
                .insert(key.from_block, key.to_block, logs);
        });
        Ok(())
    }

    async fn call_result(&self, key: &CallKey) -> Result<Option<Bytes>, CacheError> {
        Ok(self.with_inner(|inner| inner.calls.get(key).cloned()))
    }

    async fn insert_call_result(&self, key: &CallKey, result: &Bytes) -> Result<(), CacheError> {
        self.with_inner(|inner| inner.calls.insert(key.clone(), result.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_log;

    const CHAIN: u64 = 1;

    fn key(from_block: u64, to_block: u64) -> LogRangeKey {
        LogRangeKey {
            chain_id: CHAIN,
            address: Address::repeat_byte(0xaa),
            topic0: None,
            from_block,
            to_block,
        }
    }

    #[tokio::test]
    async fn miss_on_empty_cache() {
        let cache = InMemoryCache::new();
        assert!(cache.logs(&key(0, 100)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exact_hit_returns_the_full_range() {
        let cache = InMemoryCache::new();
        let log = mock_log(Address::repeat_byte(0xaa), 45, 0);
        cache.insert_logs(&key(0, 100), &[log]).await.unwrap();

        let hit = cache.logs(&key(0, 100)).await.unwrap().unwrap();
        assert_eq!((hit.from_block, hit.to_block), (0, 100));
        assert_eq!(hit.logs.len(), 1);
        assert_eq!(hit.logs[0].block_number, Some(45));
    }

    #[tokio::test]
    async fn partial_hit_is_clipped_to_the_request() {
        let cache = InMemoryCache::new();
        let log = mock_log(Address::repeat_byte(0xaa), 45, 0);
        cache.insert_logs(&key(30, 60), &[log]).await.unwrap();

        let hit = cache.logs(&key(0, 100)).await.unwrap().unwrap();
        assert_eq!((hit.from_block, hit.to_block), (30, 60));

        let clipped = cache.logs(&key(40, 50)).await.unwrap().unwrap();
        assert_eq!((clipped.from_block, clipped.to_block), (40, 50));
        assert!(clipped.logs.is_empty() || clipped.logs[0].block_number == Some(45));
    }

    #[tokio::test]
    async fn adjacent_inserts_merge_into_one_interval() {
        let cache = InMemoryCache::new();
        cache.insert_logs(&key(0, 50), &[]).await.unwrap();
        cache.insert_logs(&key(51, 100), &[]).await.unwrap();

        let hit = cache.logs(&key(0, 100)).await.unwrap().unwrap();
        assert_eq!((hit.from_block, hit.to_block), (0, 100));
    }

    #[tokio::test]
    async fn disjoint_intervals_answer_with_the_first_overlap() {
        let cache = InMemoryCache::new();
        cache.insert_logs(&key(10, 20), &[]).await.unwrap();
        cache.insert_logs(&key(40, 50), &[]).await.unwrap();

        let hit = cache.logs(&key(0, 100)).await.unwrap().unwrap();
        assert_eq!((hit.from_block, hit.to_block), (10, 20));

        let hit = cache.logs(&key(30, 100)).await.unwrap().unwrap();
        assert_eq!((hit.from_block, hit.to_block), (40, 50));
    }

    #[tokio::test]
    async fn call_results_round_trip() {
        let cache = InMemoryCache::new();
        let call_key = CallKey {
            chain_id: CHAIN,
            address: Address::repeat_byte(0xaa),
            function: "balanceOf".to_owned(),
            block_number: 7,
            data: Bytes::from_static(b"\x70\xa0\x82\x31"),
        };

        assert!(cache.call_result(&call_key).await.unwrap().is_none());
        cache.insert_call_result(&call_key, &Bytes::from_static(b"\x2a")).await.unwrap();
        assert_eq!(
            cache.call_result(&call_key).await.unwrap(),
            Some(Bytes::from_static(b"\x2a"))
        );
    }
}
