//! Bounded runs: completion semantics of `index_to_block`.

mod common;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use event_indexer::{
    IndexerError, IndexerNotification, Progress, SubscriptionOptions, ToBlock, assert_next,
    test_utils::MockRpc,
};

use crate::common::{TOKEN, collecting_indexer, positions, transfer_at};

#[tokio::test]
async fn drains_through_the_target_then_stops() -> anyhow::Result<()> {
    let rpc = MockRpc::new(100);
    rpc.push_log(transfer_at(TOKEN, 10, 0));
    // Beyond the target; must not be fetched or dispatched.
    rpc.push_log(transfer_at(TOKEN, 60, 0));

    let (mut indexer, events) = collecting_indexer(rpc.clone());
    let mut notifications = indexer.notifications();
    let handle = indexer.start();

    handle.subscribe_to_contract(SubscriptionOptions::new("Token", TOKEN)).await?;
    handle.index_to_block(50).await?.wait().await?;

    assert_eq!(positions(&events), vec![(10, 0)]);

    assert_next!(notifications, IndexerNotification::Started);
    assert_next!(
        notifications,
        IndexerNotification::Progress(Progress {
            current_block: 50,
            target_block: 50,
            pending_events: 0,
        })
    );
    assert_next!(notifications, IndexerNotification::Stopped);

    // The engine is stopped; stopping again is an error.
    assert!(matches!(handle.stop().await, Err(IndexerError::NotRunning)));

    Ok(())
}

#[tokio::test]
async fn latest_target_resolves_against_the_chain_head() -> anyhow::Result<()> {
    let rpc = MockRpc::new(70);
    rpc.push_log(transfer_at(TOKEN, 70, 0));

    let (indexer, events) = collecting_indexer(rpc.clone());
    let handle = indexer.start();

    handle.subscribe_to_contract(SubscriptionOptions::new("Token", TOKEN)).await?;
    handle.index_to_block(ToBlock::Latest).await?.wait().await?;

    assert_eq!(positions(&events), vec![(70, 0)]);
    Ok(())
}

#[tokio::test]
async fn second_run_requires_a_fresh_indexer() -> anyhow::Result<()> {
    let rpc = MockRpc::new(10);
    let (indexer, _events) = collecting_indexer(rpc.clone());
    let handle = indexer.start();

    handle.index_to_block(10).await?.wait().await?;

    // stopped -> running is not a legal transition.
    assert!(matches!(
        handle.index_to_block(20).await,
        Err(IndexerError::AlreadyStarted)
    ));
    Ok(())
}

#[tokio::test]
async fn handler_failure_rejects_the_completion() -> anyhow::Result<()> {
    let rpc = MockRpc::new(100);
    rpc.push_log(transfer_at(TOKEN, 10, 0));
    rpc.push_log(transfer_at(TOKEN, 20, 0));

    let (mut indexer, events) = collecting_indexer(rpc.clone());
    let mut notifications = indexer.notifications();

    let tripped = Arc::new(AtomicBool::new(false));
    let trip = tripped.clone();
    indexer.on("Token:Transfer", move |ctx| {
        let trip = trip.clone();
        async move {
            if ctx.event.block_number() == 20 {
                trip.store(true, Ordering::SeqCst);
                return Err("ledger out of balance".into());
            }
            Ok(())
        }
    })?;

    let handle = indexer.start();
    handle.subscribe_to_contract(SubscriptionOptions::new("Token", TOKEN)).await?;
    let completion = handle.index_to_block(100).await?;

    let result = completion.wait().await;
    assert!(matches!(result, Err(IndexerError::Handler(_))));
    assert!(tripped.load(Ordering::SeqCst));

    // The event before the failing handler stayed committed.
    assert_eq!(positions(&events), vec![(10, 0), (20, 0)]);

    assert_next!(notifications, IndexerNotification::Started);
    assert_next!(notifications, IndexerNotification::Stopped);

    Ok(())
}
