//! Dynamic event-handler registry and the context handlers run with.

use std::{collections::HashMap, sync::Arc};

use alloy::dyn_abi::DynSolValue;
use futures::{FutureExt, future::BoxFuture};
use tokio::sync::mpsc;

use crate::{
    HandlerError, IndexerError,
    reader::{ContractReader, ReadRequest},
    subscription::SubscriptionOptions,
    types::Event,
};

type BoxedHandler =
    Arc<dyn Fn(EventContext) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// What an event handler gets to work with.
///
/// Besides the decoded event itself, handlers can issue cache-through
/// contract reads and register new subscriptions; the latter makes the
/// processor stop draining so the fetch planner can catch the new
/// subscription up before further progress is reported.
pub struct EventContext {
    pub event: Event,
    reader: ContractReader,
    subscribe_tx: mpsc::UnboundedSender<SubscriptionOptions>,
}

impl EventContext {
    pub(crate) fn new(
        event: Event,
        reader: ContractReader,
        subscribe_tx: mpsc::UnboundedSender<SubscriptionOptions>,
    ) -> Self {
        Self { event, reader, subscribe_tx }
    }

    /// Cache-through contract read, safe to call mid-dispatch.
    pub async fn read_contract(
        &self,
        request: ReadRequest,
    ) -> Result<Vec<DynSolValue>, IndexerError> {
        self.reader.read(request).await
    }

    /// Registers a new subscription from inside a handler.
    ///
    /// The contract name is validated here, synchronously; the subscription
    /// itself is inserted by the engine right after this handler returns.
    pub fn subscribe_to_contract(&self, options: SubscriptionOptions) -> Result<(), IndexerError> {
        self.reader.registry().get(&options.contract_name)?;
        self.subscribe_tx.send(options).map_err(|_| IndexerError::ServiceShutdown)
    }
}

/// Handlers keyed by `"{contract}:{event}"` plus the generic channel that
/// receives every decoded event.
#[derive(Clone, Default)]
pub(crate) struct HandlerRegistry {
    generic: Vec<BoxedHandler>,
    keyed: HashMap<String, Vec<BoxedHandler>>,
}

impl HandlerRegistry {
    pub(crate) fn add_generic<F, Fut>(&mut self, handler: F)
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.generic.push(Arc::new(move |ctx| handler(ctx).boxed()));
    }

    pub(crate) fn add_keyed<F, Fut>(&mut self, key: String, handler: F)
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.keyed.entry(key).or_default().push(Arc::new(move |ctx| handler(ctx).boxed()));
    }

    /// Dispatches one event: the generic channel first, then the keyed
    /// handlers, each awaited serially. A handler error aborts the dispatch
    /// (and with it the tick); whatever was already delivered stays
    /// delivered.
    pub(crate) async fn dispatch(
        &self,
        event: &Event,
        reader: &ContractReader,
        subscribe_tx: &mpsc::UnboundedSender<SubscriptionOptions>,
    ) -> Result<(), IndexerError> {
        let keyed = self.keyed.get(&event.key());
        let handlers = self.generic.iter().chain(keyed.into_iter().flatten());

        for handler in handlers {
            let ctx = EventContext::new(event.clone(), reader.clone(), subscribe_tx.clone());
            handler(ctx).await.map_err(IndexerError::handler)?;
        }
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.generic.is_empty() && self.keyed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use alloy::primitives::{Address, U256};

    use super::*;
    use crate::{
        abi::AbiRegistry,
        test_utils::{MockRpc, erc20_abi, transfer_log},
    };

    fn reader() -> ContractReader {
        let mut registry = AbiRegistry::new();
        registry.insert("Token", erc20_abi());
        ContractReader::new(1, Arc::new(registry), Arc::new(MockRpc::new(0)), None)
    }

    fn event(name: &str) -> Event {
        Event {
            subscription_id: "sub".to_owned(),
            contract_name: "Token".to_owned(),
            event_name: name.to_owned(),
            args: Vec::new(),
            log: transfer_log(Address::ZERO, 1, 0, Address::ZERO, Address::ZERO, U256::ZERO),
        }
    }

    #[tokio::test]
    async fn generic_runs_before_keyed() {
        let mut registry = HandlerRegistry::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let sink = order.clone();
        registry.add_generic(move |_ctx| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push("generic");
                Ok(())
            }
        });
        let sink = order.clone();
        registry.add_keyed("Token:Transfer".to_owned(), move |_ctx| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push("keyed");
                Ok(())
            }
        });

        let (tx, _rx) = mpsc::unbounded_channel();
        registry.dispatch(&event("Transfer"), &reader(), &tx).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["generic", "keyed"]);
    }

    #[tokio::test]
    async fn keyed_handlers_only_see_their_event() {
        let mut registry = HandlerRegistry::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        registry.add_keyed("Token:Transfer".to_owned(), move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let (tx, _rx) = mpsc::unbounded_channel();
        registry.dispatch(&event("Approval"), &reader(), &tx).await.unwrap();
        registry.dispatch(&event("Transfer"), &reader(), &tx).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_errors_abort_the_dispatch() {
        let mut registry = HandlerRegistry::default();
        registry.add_generic(|_ctx| async { Err::<(), HandlerError>("boom".into()) });

        let ran_after = Arc::new(AtomicUsize::new(0));
        let counter = ran_after.clone();
        registry.add_keyed("Token:Transfer".to_owned(), move |_ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = registry.dispatch(&event("Transfer"), &reader(), &tx).await;

        assert!(matches!(result, Err(IndexerError::Handler(_))));
        assert_eq!(ran_after.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn subscribe_validates_the_contract_name() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = EventContext::new(event("Transfer"), reader(), tx);

        let unknown = SubscriptionOptions::new("Nope", Address::ZERO);
        assert!(matches!(
            ctx.subscribe_to_contract(unknown),
            Err(IndexerError::UnknownContract(_))
        ));

        let known = SubscriptionOptions::new("Token", Address::repeat_byte(0xbb));
        ctx.subscribe_to_contract(known).unwrap();
        assert_eq!(rx.try_recv().unwrap().contract_name, "Token");
    }
}
