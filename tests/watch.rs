//! Watch mode: following the chain head across poll ticks.

mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use event_indexer::{IndexerNotification, Progress, SubscriptionOptions, test_utils::MockRpc};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};

use crate::common::{TOKEN, collecting_indexer, positions, transfer_at};

/// Reads notifications until a progress report reaches `current_block`,
/// skipping earlier ticks.
async fn progress_reaches(
    notifications: &mut ReceiverStream<IndexerNotification>,
    current_block: u64,
) -> Progress {
    loop {
        let notification =
            tokio::time::timeout(Duration::from_secs(5), notifications.next())
                .await
                .expect("timed out")
                .expect("notification stream closed");
        if let IndexerNotification::Progress(progress) = notification
            && progress.current_block >= current_block
        {
            return progress;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn follows_the_head_across_ticks() -> anyhow::Result<()> {
    let rpc = MockRpc::new(100);
    rpc.push_log(transfer_at(TOKEN, 10, 0));

    let (mut indexer, events) = collecting_indexer(rpc.clone());
    let mut notifications = indexer.notifications();
    let handle = indexer.start();

    handle.subscribe_to_contract(SubscriptionOptions::new("Token", TOKEN)).await?;
    handle.watch().await?;

    let progress = progress_reaches(&mut notifications, 100).await;
    assert_eq!(progress.target_block, 100);
    assert_eq!(positions(&events), vec![(10, 0)]);

    // The chain advances; the next poll picks up the new log.
    rpc.push_log(transfer_at(TOKEN, 105, 0));
    rpc.set_head(110);

    let progress = progress_reaches(&mut notifications, 110).await;
    assert_eq!(progress.current_block, 110);
    assert_eq!(positions(&events), vec![(10, 0), (105, 0)]);

    handle.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn block_confirmations_lag_the_target_behind_the_head() -> anyhow::Result<()> {
    let rpc = MockRpc::new(100);
    rpc.push_log(transfer_at(TOKEN, 95, 0));

    let mut indexer = event_indexer::IndexerBuilder::new(1)
        .contract("Token", event_indexer::test_utils::erc20_abi())
        .block_confirmations(10)
        .connect(rpc.clone())?;
    let events = common::record_events(&mut indexer);
    let mut notifications = indexer.notifications();
    let handle = indexer.start();

    handle.subscribe_to_contract(SubscriptionOptions::new("Token", TOKEN)).await?;
    handle.watch().await?;

    // Head 100 with 10 confirmations indexes only through 90.
    let progress = progress_reaches(&mut notifications, 90).await;
    assert_eq!(progress.target_block, 90);
    assert!(positions(&events).is_empty());

    // Once the head moves past 105, block 95 is confirmed.
    rpc.set_head(110);
    progress_reaches(&mut notifications, 100).await;
    assert_eq!(positions(&events), vec![(95, 0)]);

    handle.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn tick_errors_surface_but_polling_continues() -> anyhow::Result<()> {
    let rpc = MockRpc::new(100);
    rpc.push_log(transfer_at(TOKEN, 10, 0));

    let (mut indexer, _events) = collecting_indexer(rpc.clone());

    let failed_once = Arc::new(AtomicBool::new(false));
    let flag = failed_once.clone();
    indexer.on("Token:Transfer", move |_ctx| {
        let flag = flag.clone();
        async move {
            if !flag.swap(true, Ordering::SeqCst) {
                return Err("transient handler failure".into());
            }
            Ok(())
        }
    })?;

    let mut notifications = indexer.notifications();
    let handle = indexer.start();

    handle.subscribe_to_contract(SubscriptionOptions::new("Token", TOKEN)).await?;
    handle.watch().await?;

    // First tick fails in the handler, the engine reports and keeps going.
    let mut saw_error = false;
    loop {
        let notification = tokio::time::timeout(Duration::from_secs(5), notifications.next())
            .await?
            .expect("notification stream closed");
        match notification {
            IndexerNotification::Error(_) => saw_error = true,
            IndexerNotification::Progress(_) => break,
            _ => {}
        }
    }
    assert!(saw_error);
    assert!(failed_once.load(Ordering::SeqCst));

    handle.stop().await?;
    Ok(())
}
