//! ABI registry backing event decoding and contract calls.
//!
//! Contracts are registered once by name via
//! [`IndexerBuilder::contract`](crate::IndexerBuilder::contract); the engine
//! derives topic-0 filter sets from the declared events and decodes logs and
//! call results client-side with `alloy`'s dynamic ABI codec.

use std::collections::{BTreeMap, HashMap};

use alloy::{
    dyn_abi::{DynSolValue, EventExt, FunctionExt, JsonAbiExt},
    json_abi::{Event as AbiEvent, Function, JsonAbi},
    primitives::B256,
    rpc::types::Log,
};
use thiserror::Error;

use crate::IndexerError;

/// Why a fetched log could not be turned into an [`Event`](crate::Event).
///
/// Decode failures are logged at `warn` and the log is skipped; they never
/// abort a drain.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("log has no topic0")]
    MissingTopic0,

    #[error("no event with topic0 {0} declared on contract {1:?}")]
    UnknownTopic0(B256, String),

    #[error(transparent)]
    Codec(#[from] alloy::dyn_abi::Error),
}

/// A registered contract: its ABI plus the topic0 lookup table derived from
/// the declared (non-anonymous) events.
#[derive(Debug, Clone)]
pub struct ContractAbi {
    name: String,
    abi: JsonAbi,
    events_by_topic0: HashMap<B256, AbiEvent>,
}

impl ContractAbi {
    fn new(name: String, abi: JsonAbi) -> Self {
        let events_by_topic0 = abi
            .events()
            .filter(|event| !event.anonymous)
            .map(|event| (event.selector(), event.clone()))
            .collect();
        Self { name, abi, events_by_topic0 }
    }

    /// The contract name this ABI was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Topic-0 hashes of every declared event, in a stable order.
    ///
    /// This is the single topic-0 disjunction the fetch planner puts on
    /// `eth_getLogs` filters; no further topic filtering is applied upstream.
    #[must_use]
    pub fn topic0_hashes(&self) -> Vec<B256> {
        let mut hashes: Vec<B256> = self.events_by_topic0.keys().copied().collect();
        hashes.sort_unstable();
        hashes
    }

    /// Whether `topic0` belongs to one of the declared events.
    #[must_use]
    pub fn matches_topic0(&self, topic0: &B256) -> bool {
        self.events_by_topic0.contains_key(topic0)
    }

    /// Whether an event with this name is declared.
    #[must_use]
    pub fn has_event(&self, event_name: &str) -> bool {
        self.events_by_topic0.values().any(|event| event.name == event_name)
    }

    /// Decodes a log against the declared events.
    ///
    /// Arguments come back in declaration order, indexed and non-indexed
    /// parameters interleaved as the ABI lists them.
    pub fn decode_log(&self, log: &Log) -> Result<(String, Vec<DynSolValue>), DecodeError> {
        let topic0 = log.topic0().ok_or(DecodeError::MissingTopic0)?;
        let event = self
            .events_by_topic0
            .get(topic0)
            .ok_or_else(|| DecodeError::UnknownTopic0(*topic0, self.name.clone()))?;

        let decoded =
            event.decode_log_parts(log.data().topics().iter().copied(), &log.data().data)?;

        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        let args = event
            .inputs
            .iter()
            .filter_map(|input| if input.indexed { indexed.next() } else { body.next() })
            .collect();

        Ok((event.name.clone(), args))
    }

    /// Looks up a (non-overloaded) function by name.
    pub fn function(&self, function_name: &str) -> Result<&Function, IndexerError> {
        self.abi
            .function(function_name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| IndexerError::UnknownFunction {
                contract: self.name.clone(),
                function: function_name.to_owned(),
            })
    }

    /// ABI-encodes a call to `function_name` with `args` (selector included).
    pub fn encode_call(
        &self,
        function_name: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<u8>, IndexerError> {
        let function = self.function(function_name)?;
        function.abi_encode_input(args).map_err(IndexerError::abi)
    }

    /// Decodes the return data of a call to `function_name`.
    pub fn decode_return(
        &self,
        function_name: &str,
        data: &[u8],
    ) -> Result<Vec<DynSolValue>, IndexerError> {
        let function = self.function(function_name)?;
        function.abi_decode_output(data).map_err(IndexerError::abi)
    }
}

/// Name-keyed collection of registered contract ABIs.
#[derive(Debug, Clone, Default)]
pub struct AbiRegistry {
    contracts: BTreeMap<String, ContractAbi>,
}

impl AbiRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `abi` under `name`, replacing any previous registration.
    pub fn insert(&mut self, name: impl Into<String>, abi: JsonAbi) {
        let name = name.into();
        self.contracts.insert(name.clone(), ContractAbi::new(name, abi));
    }

    /// Looks up a contract by name; unknown names are a configuration error.
    pub fn get(&self, name: &str) -> Result<&ContractAbi, IndexerError> {
        self.contracts.get(name).ok_or_else(|| IndexerError::UnknownContract(name.to_owned()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }
}
