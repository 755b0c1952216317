//! The engine's single logical task: command handling plus the poll loop.
//!
//! All mutable state (subscription map, queue, lifecycle state) lives in the
//! service and is touched by exactly one task; external callers interact
//! through the command channel and therefore interleave only between awaits.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};

use crate::{
    IndexerError, Subscription, ToBlock,
    abi::AbiRegistry,
    cache::EventCache,
    fetcher::FetchPlanner,
    indexer::HandlerRegistry,
    processor::EventProcessor,
    queue::EventQueue,
    reader::ContractReader,
    rpc::RpcClient,
    store::{StoredSubscription, SubscriptionStore},
    subscription::SubscriptionOptions,
    types::{IndexerNotification, Progress},
};

pub(crate) type CompletionSender = oneshot::Sender<Result<(), IndexerError>>;
pub(crate) type CompletionReceiver = oneshot::Receiver<Result<(), IndexerError>>;

#[derive(Debug)]
pub(crate) enum Command {
    Watch {
        response: oneshot::Sender<Result<(), IndexerError>>,
    },
    IndexToBlock {
        to_block: ToBlock,
        response: oneshot::Sender<Result<CompletionReceiver, IndexerError>>,
    },
    Stop {
        response: oneshot::Sender<Result<(), IndexerError>>,
    },
    Subscribe {
        options: SubscriptionOptions,
        response: oneshot::Sender<Result<(), IndexerError>>,
    },
}

/// What the engine is currently polling toward.
#[derive(Copy, Clone, Debug)]
enum Target {
    /// Follow the chain head (minus the configured confirmation lag).
    Latest,
    /// Drain through a concrete height, then stop.
    Block(u64),
}

#[derive(Debug)]
struct RunningState {
    target: Target,
    /// Deadline of the next scheduled poll; `None` while a tick is running.
    next_tick: Option<Instant>,
    /// Resolves the `index_to_block` completion, when one is attached.
    completion: Option<CompletionSender>,
}

#[derive(Debug)]
enum State {
    Initial,
    Running(RunningState),
    Stopped,
}

pub(crate) struct ServiceConfig {
    pub(crate) chain_id: u64,
    pub(crate) poll_interval: Duration,
    pub(crate) block_confirmations: u64,
    pub(crate) max_block_range: u64,
}

pub(crate) struct Service {
    config: ServiceConfig,
    registry: Arc<AbiRegistry>,
    rpc: Arc<dyn RpcClient>,
    cache: Option<Arc<dyn EventCache>>,
    store: Option<Arc<dyn SubscriptionStore>>,
    handlers: HandlerRegistry,
    reader: ContractReader,
    notifications: Vec<mpsc::Sender<IndexerNotification>>,
    subscriptions: BTreeMap<String, Subscription>,
    queue: EventQueue,
    state: State,
    commands: mpsc::Receiver<Command>,
    subscribe_tx: mpsc::UnboundedSender<SubscriptionOptions>,
    subscribe_rx: mpsc::UnboundedReceiver<SubscriptionOptions>,
}

impl Service {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: ServiceConfig,
        registry: Arc<AbiRegistry>,
        rpc: Arc<dyn RpcClient>,
        cache: Option<Arc<dyn EventCache>>,
        store: Option<Arc<dyn SubscriptionStore>>,
        handlers: HandlerRegistry,
        notifications: Vec<mpsc::Sender<IndexerNotification>>,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let reader =
            ContractReader::new(config.chain_id, registry.clone(), rpc.clone(), cache.clone());
        let (subscribe_tx, subscribe_rx) = mpsc::unbounded_channel();
        Self {
            config,
            registry,
            rpc,
            cache,
            store,
            handlers,
            reader,
            notifications,
            subscriptions: BTreeMap::new(),
            queue: EventQueue::new(),
            state: State::Initial,
            commands,
            subscribe_tx,
            subscribe_rx,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("indexer service started");

        loop {
            let next_tick = match &self.state {
                State::Running(running) => running.next_tick,
                _ => None,
            };
            let tick_due = async {
                match next_tick {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!("all handles dropped, shutting down service");
                            break;
                        }
                    }
                }
                () = tick_due => {
                    self.run_tick().await;
                }
            }
        }

        info!("indexer service stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Watch { response } => {
                let result = self.handle_watch().await;
                let _ = response.send(result);
            }
            Command::IndexToBlock { to_block, response } => {
                let result = self.handle_index_to_block(to_block).await;
                let _ = response.send(result);
            }
            Command::Stop { response } => {
                let _ = response.send(self.handle_stop());
            }
            Command::Subscribe { options, response } => {
                let _ = response.send(self.handle_subscribe(options));
            }
        }
    }

    /// `initial -> running(latest)`, loading stored subscriptions first.
    async fn handle_watch(&mut self) -> Result<(), IndexerError> {
        if !matches!(self.state, State::Initial) {
            return Err(IndexerError::AlreadyStarted);
        }

        if let Some(store) = &self.store {
            let stored = store.all().await?;
            let count = stored.len();
            for snapshot in stored {
                let subscription = snapshot.into_subscription()?;
                self.registry.get(&subscription.contract_name)?;
                self.subscriptions.insert(subscription.id.clone(), subscription);
            }
            info!(count, "loaded subscriptions from store");
        }

        self.state = State::Running(RunningState {
            target: Target::Latest,
            next_tick: Some(Instant::now()),
            completion: None,
        });
        self.notify(IndexerNotification::Started);
        Ok(())
    }

    /// `initial -> running(block)`, resolving `latest` against the chain.
    async fn handle_index_to_block(
        &mut self,
        to_block: ToBlock,
    ) -> Result<CompletionReceiver, IndexerError> {
        if !matches!(self.state, State::Initial) {
            return Err(IndexerError::AlreadyStarted);
        }

        let target = match to_block {
            ToBlock::Block(block) => block,
            ToBlock::Latest => self.rpc.get_last_block_number().await?,
        };
        info!(target_block = target, "indexing to block");

        let (completion_tx, completion_rx) = oneshot::channel();
        self.state = State::Running(RunningState {
            target: Target::Block(target),
            next_tick: Some(Instant::now()),
            completion: Some(completion_tx),
        });
        self.notify(IndexerNotification::Started);
        Ok(completion_rx)
    }

    /// `running -> stopped`; cancels the scheduled tick.
    fn handle_stop(&mut self) -> Result<(), IndexerError> {
        let State::Running(running) = &mut self.state else {
            return Err(IndexerError::NotRunning);
        };
        let completion = running.completion.take();
        self.state = State::Stopped;
        self.notify(IndexerNotification::Stopped);
        if let Some(completion) = completion {
            let _ = completion.send(Ok(()));
        }
        Ok(())
    }

    fn handle_subscribe(&mut self, options: SubscriptionOptions) -> Result<(), IndexerError> {
        self.registry.get(&options.contract_name)?;
        let subscription = Subscription::new(options);
        info!(
            subscription = %subscription.id,
            contract = %subscription.contract_name,
            from_block = subscription.from_block,
            "subscription registered"
        );
        self.subscriptions.insert(subscription.id.clone(), subscription);
        Ok(())
    }

    async fn run_tick(&mut self) {
        match &mut self.state {
            State::Running(running) => running.next_tick = None,
            _ => return,
        }

        if let Err(error) = self.tick().await {
            error!(error = %error, "poll tick failed");
            let fatal = matches!(&self.state, State::Running(r) if r.completion.is_some());
            if fatal {
                // A bounded run cannot make progress past a failed tick.
                self.finish(Err(error)).await;
            } else {
                self.notify(IndexerNotification::Error(error));
                self.schedule_tick(self.config.poll_interval);
            }
        }
    }

    async fn tick(&mut self) -> Result<(), IndexerError> {
        let State::Running(running) = &self.state else {
            return Ok(());
        };
        let target = running.target;

        let target_block = match target {
            Target::Latest => {
                let head = self.rpc.get_last_block_number().await?;
                head.saturating_sub(self.config.block_confirmations)
            }
            Target::Block(block) => block,
        };
        trace!(target_block, "poll tick");

        let planner = FetchPlanner {
            chain_id: self.config.chain_id,
            max_block_range: self.config.max_block_range,
            registry: &self.registry,
            rpc: self.rpc.as_ref(),
            cache: self.cache.as_deref(),
        };
        planner
            .fetch_subscription_events(target_block, self.subscriptions.values(), &mut self.queue)
            .await?;

        // The planner either covered every range or errored out above.
        for subscription in self.subscriptions.values_mut() {
            subscription.fetched_to_block = Some(target_block);
        }

        let mut processor = EventProcessor {
            registry: &self.registry,
            handlers: &self.handlers,
            reader: &self.reader,
            subscribe_tx: &self.subscribe_tx,
            subscribe_rx: &mut self.subscribe_rx,
        };
        let outcome =
            processor.process_events(&mut self.queue, target_block, &mut self.subscriptions).await?;
        trace!(
            watermark_block = ?outcome.watermark.0,
            watermark_log_index = outcome.watermark.1,
            "event drain complete"
        );

        if outcome.has_new_subscriptions {
            // Replan immediately so the new subscription catches up before
            // further progress is reported.
            self.persist_subscriptions().await?;
            self.schedule_tick(Duration::ZERO);
            return Ok(());
        }

        for subscription in self.subscriptions.values_mut() {
            subscription.mark_caught_up(target_block);
        }

        self.notify(IndexerNotification::Progress(Progress {
            current_block: target_block,
            target_block,
            pending_events: self.queue.len(),
        }));
        self.persist_subscriptions().await?;

        if matches!(target, Target::Block(_)) {
            info!(target_block, "reached configured target block");
            self.finish(Ok(())).await;
            return Ok(());
        }

        self.schedule_tick(self.config.poll_interval);
        Ok(())
    }

    async fn persist_subscriptions(&self) -> Result<(), IndexerError> {
        if let Some(store) = &self.store {
            let snapshot: Vec<StoredSubscription> =
                self.subscriptions.values().map(Into::into).collect();
            store.save(&snapshot).await?;
        }
        Ok(())
    }

    fn schedule_tick(&mut self, delay: Duration) {
        if let State::Running(running) = &mut self.state {
            running.next_tick = Some(Instant::now() + delay);
        }
    }

    /// `running -> stopped` with a completion result.
    async fn finish(&mut self, result: Result<(), IndexerError>) {
        let completion = match &mut self.state {
            State::Running(running) => running.completion.take(),
            _ => None,
        };
        self.state = State::Stopped;
        self.notify(IndexerNotification::Stopped);
        if let Some(completion) = completion {
            let _ = completion.send(result);
        }
    }

    /// Best-effort fan-out; a stalled listener drops notifications rather
    /// than wedging the poll loop.
    fn notify(&mut self, notification: IndexerNotification) {
        self.notifications.retain(|sender| !sender.is_closed());
        for sender in &self.notifications {
            if sender.try_send(notification.clone()).is_err() {
                debug!("dropping notification for slow listener");
            }
        }
    }
}
