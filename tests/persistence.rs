//! Durable cursors: snapshots on every tick, resume on `watch`.

mod common;

use std::{sync::Arc, time::Duration};

use event_indexer::{
    IndexerBuilder, IndexerNotification, SubscriptionOptions,
    store::{InMemoryStore, SubscriptionStore},
    test_utils::{MockRpc, erc20_abi},
};
use tokio_stream::StreamExt;

use crate::common::{CHAIN_ID, TOKEN, positions, record_events, transfer_at};

#[tokio::test]
async fn cursors_are_persisted_after_the_run() -> anyhow::Result<()> {
    let rpc = MockRpc::new(100);
    rpc.push_log(transfer_at(TOKEN, 10, 0));
    let store = Arc::new(InMemoryStore::new());

    let mut indexer = IndexerBuilder::new(CHAIN_ID)
        .contract("Token", erc20_abi())
        .store(store.clone())
        .connect(rpc)?;
    let _events = record_events(&mut indexer);
    let handle = indexer.start();

    handle
        .subscribe_to_contract(SubscriptionOptions::new("Token", TOKEN).from_block(5))
        .await?;
    handle.index_to_block(100).await?.wait().await?;

    let stored = store.all().await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, TOKEN.to_checksum(None));
    assert_eq!(stored[0].contract_name, "Token");
    assert_eq!(stored[0].contract_address, TOKEN.to_checksum(None));
    assert_eq!(stored[0].from_block, 5);
    assert_eq!(stored[0].indexed_to_block, Some(100));
    assert_eq!(stored[0].indexed_to_log_index, 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn watch_resumes_from_the_stored_cursor_without_duplicates() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStore::new());

    // First run indexes through block 100.
    {
        let rpc = MockRpc::new(100);
        rpc.push_log(transfer_at(TOKEN, 10, 0));
        let mut indexer = IndexerBuilder::new(CHAIN_ID)
            .contract("Token", erc20_abi())
            .store(store.clone())
            .connect(rpc)?;
        let events = record_events(&mut indexer);
        let handle = indexer.start();
        handle.subscribe_to_contract(SubscriptionOptions::new("Token", TOKEN)).await?;
        handle.index_to_block(100).await?.wait().await?;
        assert_eq!(positions(&events), vec![(10, 0)]);
    }

    // Second run loads the stored subscription via watch(); the old event
    // re-enters the queue (nothing fetched yet) but dedups against the
    // restored cursor.
    let rpc = MockRpc::new(120);
    rpc.push_log(transfer_at(TOKEN, 10, 0));
    rpc.push_log(transfer_at(TOKEN, 110, 0));
    let mut indexer = IndexerBuilder::new(CHAIN_ID)
        .contract("Token", erc20_abi())
        .store(store.clone())
        .connect(rpc)?;
    let events = record_events(&mut indexer);
    let mut notifications = indexer.notifications();
    let handle = indexer.start();

    // No explicit subscribe: the stored subscription carries the run.
    handle.watch().await?;

    loop {
        let notification = tokio::time::timeout(Duration::from_secs(5), notifications.next())
            .await?
            .expect("notification stream closed");
        if matches!(notification, IndexerNotification::Progress(p) if p.current_block >= 120) {
            break;
        }
    }

    assert_eq!(positions(&events), vec![(110, 0)]);
    handle.stop().await?;

    Ok(())
}
