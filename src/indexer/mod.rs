//! Indexer core: configuration, handler registration, and the public handle
//! driving the poll-loop service.

use std::{sync::Arc, time::Duration};

use alloy::{dyn_abi::DynSolValue, json_abi::JsonAbi};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    HandlerError, IndexerError, ToBlock,
    abi::AbiRegistry,
    cache::EventCache,
    reader::{ContractReader, ReadRequest},
    rpc::RpcClient,
    store::SubscriptionStore,
    subscription::SubscriptionOptions,
    types::IndexerNotification,
};

mod handlers;
mod service;

pub use handlers::EventContext;
pub(crate) use handlers::HandlerRegistry;

use service::{Command, CompletionReceiver, Service, ServiceConfig};

/// Pause between poll ticks once caught up.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Proactive upper bound on blocks per `eth_getLogs` request.
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 1000;

/// Confirmation lag applied to the chain head in watch mode.
pub const DEFAULT_BLOCK_CONFIRMATIONS: u64 = 0;

/// Per-listener buffer for lifecycle notifications.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// Configures and assembles an [`Indexer`].
///
/// # Example
///
/// ```no_run
/// # use event_indexer::{IndexerBuilder, StandardClientBuilder};
/// # fn example(abi: alloy::json_abi::JsonAbi) -> Result<(), Box<dyn std::error::Error>> {
/// let rpc = StandardClientBuilder::new().connect_http("http://localhost:8545".parse()?);
/// let indexer = IndexerBuilder::new(1)
///     .contract("Token", abi)
///     .connect(rpc)?;
/// # Ok(())
/// # }
/// ```
pub struct IndexerBuilder {
    chain_id: u64,
    poll_interval: Duration,
    block_confirmations: u64,
    max_block_range: u64,
    notification_capacity: usize,
    registry: AbiRegistry,
    cache: Option<Arc<dyn EventCache>>,
    store: Option<Arc<dyn SubscriptionStore>>,
}

impl IndexerBuilder {
    #[must_use]
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            poll_interval: DEFAULT_POLL_INTERVAL,
            block_confirmations: DEFAULT_BLOCK_CONFIRMATIONS,
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            registry: AbiRegistry::new(),
            cache: None,
            store: None,
        }
    }

    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Lags the watch-mode target behind the chain head by this many blocks.
    #[must_use]
    pub fn block_confirmations(mut self, block_confirmations: u64) -> Self {
        self.block_confirmations = block_confirmations;
        self
    }

    #[must_use]
    pub fn max_block_range(mut self, max_block_range: u64) -> Self {
        self.max_block_range = max_block_range;
        self
    }

    #[must_use]
    pub fn notification_capacity(mut self, notification_capacity: usize) -> Self {
        self.notification_capacity = notification_capacity;
        self
    }

    /// Registers a contract ABI under `name` for decoding and calls.
    #[must_use]
    pub fn contract(mut self, name: impl Into<String>, abi: JsonAbi) -> Self {
        self.registry.insert(name, abi);
        self
    }

    /// Attaches a log/call cache.
    #[must_use]
    pub fn cache(mut self, cache: impl EventCache + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Attaches a durable subscription store.
    #[must_use]
    pub fn store(mut self, store: impl SubscriptionStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Validates the configuration and binds the RPC client.
    ///
    /// # Errors
    ///
    /// Returns an error when the poll interval or max block range is zero.
    pub fn connect(self, rpc: impl RpcClient + 'static) -> Result<Indexer, IndexerError> {
        if self.poll_interval.is_zero() {
            return Err(IndexerError::InvalidPollInterval);
        }
        if self.max_block_range == 0 {
            return Err(IndexerError::InvalidMaxBlockRange);
        }
        Ok(Indexer {
            config: ServiceConfig {
                chain_id: self.chain_id,
                poll_interval: self.poll_interval,
                block_confirmations: self.block_confirmations,
                max_block_range: self.max_block_range,
            },
            notification_capacity: self.notification_capacity,
            registry: self.registry,
            rpc: Arc::new(rpc),
            cache: self.cache,
            store: self.store,
            handlers: HandlerRegistry::default(),
            notifications: Vec::new(),
        })
    }
}

/// A configured engine, pre-start.
///
/// Register handlers and notification listeners here, then call
/// [`start`](Indexer::start) to spawn the service and obtain the
/// [`IndexerHandle`] used to drive it.
pub struct Indexer {
    config: ServiceConfig,
    notification_capacity: usize,
    registry: AbiRegistry,
    rpc: Arc<dyn RpcClient>,
    cache: Option<Arc<dyn EventCache>>,
    store: Option<Arc<dyn SubscriptionStore>>,
    handlers: HandlerRegistry,
    notifications: Vec<mpsc::Sender<IndexerNotification>>,
}

impl Indexer {
    /// Registers a handler for one event kind, keyed `"Contract:Event"`.
    ///
    /// The key is validated against the registered ABIs; unknown contracts or
    /// events fail here, synchronously.
    pub fn on<F, Fut>(&mut self, key: &str, handler: F) -> Result<(), IndexerError>
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let Some((contract, event)) = key.split_once(':') else {
            return Err(IndexerError::InvalidHandlerKey(key.to_owned()));
        };
        let abi = self.registry.get(contract)?;
        if !abi.has_event(event) {
            return Err(IndexerError::UnknownEvent {
                contract: contract.to_owned(),
                event: event.to_owned(),
            });
        }
        self.handlers.add_keyed(key.to_owned(), handler);
        Ok(())
    }

    /// Registers a handler on the generic channel receiving every decoded
    /// event.
    pub fn on_event<F, Fut>(&mut self, handler: F)
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.handlers.add_generic(handler);
    }

    /// Creates a lifecycle-notification stream.
    ///
    /// Delivery is best effort: a listener that stops reading misses
    /// notifications instead of stalling the engine.
    pub fn notifications(&mut self) -> ReceiverStream<IndexerNotification> {
        let (sender, receiver) = mpsc::channel(self.notification_capacity);
        self.notifications.push(sender);
        ReceiverStream::new(receiver)
    }

    /// Spawns the service task and returns the handle driving it.
    ///
    /// The service shuts down once every handle is dropped.
    #[must_use]
    pub fn start(self) -> IndexerHandle {
        if self.handlers.is_empty() {
            warn!("indexer started without event handlers");
        }
        let registry = Arc::new(self.registry);
        let reader = ContractReader::new(
            self.config.chain_id,
            registry.clone(),
            self.rpc.clone(),
            self.cache.clone(),
        );
        let (command_tx, command_rx) = mpsc::channel(64);
        let service = Service::new(
            self.config,
            registry,
            self.rpc,
            self.cache,
            self.store,
            self.handlers,
            self.notifications,
            command_rx,
        );
        tokio::spawn(service.run());
        IndexerHandle { commands: command_tx, reader }
    }
}

/// Resolves when an [`index_to_block`](IndexerHandle::index_to_block) run
/// reaches its target (or fails fatally).
#[derive(Debug)]
pub struct Completion {
    receiver: CompletionReceiver,
}

impl Completion {
    /// Waits for the run to finish.
    pub async fn wait(self) -> Result<(), IndexerError> {
        self.receiver.await.map_err(|_| IndexerError::ServiceShutdown)?
    }
}

/// Cloneable client for a started indexer.
#[derive(Clone)]
pub struct IndexerHandle {
    commands: mpsc::Sender<Command>,
    reader: ContractReader,
}

impl IndexerHandle {
    /// Starts following the chain head; first poll runs immediately.
    pub async fn watch(&self) -> Result<(), IndexerError> {
        let (response, result) = oneshot::channel();
        self.commands
            .send(Command::Watch { response })
            .await
            .map_err(|_| IndexerError::ServiceShutdown)?;
        result.await.map_err(|_| IndexerError::ServiceShutdown)?
    }

    /// Indexes through `to_block` inclusive, then stops.
    ///
    /// The returned [`Completion`] resolves once the engine has drained
    /// through the target and emitted `Stopped`.
    pub async fn index_to_block(
        &self,
        to_block: impl Into<ToBlock>,
    ) -> Result<Completion, IndexerError> {
        let (response, result) = oneshot::channel();
        self.commands
            .send(Command::IndexToBlock { to_block: to_block.into(), response })
            .await
            .map_err(|_| IndexerError::ServiceShutdown)?;
        let receiver = result.await.map_err(|_| IndexerError::ServiceShutdown)??;
        Ok(Completion { receiver })
    }

    /// Stops a running engine. Erring when not running.
    pub async fn stop(&self) -> Result<(), IndexerError> {
        let (response, result) = oneshot::channel();
        self.commands
            .send(Command::Stop { response })
            .await
            .map_err(|_| IndexerError::ServiceShutdown)?;
        result.await.map_err(|_| IndexerError::ServiceShutdown)?
    }

    /// Registers a subscription; same id (default: checksummed address)
    /// overwrites.
    pub async fn subscribe_to_contract(
        &self,
        options: SubscriptionOptions,
    ) -> Result<(), IndexerError> {
        let (response, result) = oneshot::channel();
        self.commands
            .send(Command::Subscribe { options, response })
            .await
            .map_err(|_| IndexerError::ServiceShutdown)?;
        result.await.map_err(|_| IndexerError::ServiceShutdown)?
    }

    /// Cache-through contract read; safe to call at any time.
    pub async fn read_contract(
        &self,
        request: ReadRequest,
    ) -> Result<Vec<DynSolValue>, IndexerError> {
        self.reader.read(request).await
    }
}
