#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use raffle_sync_contracts::{FactoryAddresses, LogMeta, RawLog};
use raffle_sync_core::{Family, TokenId};
use raffle_sync_indexer::{
    ChainReader, Clock, CommitmentPipeline, Dispatch, Dispatcher, EntitySequencer, IndexerError,
    IndexerResult, Ledger, ManualClock, MemoryStore, PipelineTimings, Reconciler, RecordStore,
    WinnerAnnouncer,
};
use tokio::sync::Notify;

/// 2023-11-14T22:13:20Z
pub const NOW_MS: u64 = 1_700_000_000_000;

pub const TIMINGS: PipelineTimings = PipelineTimings {
    proof_delay: Duration::from_millis(60),
    min_root_delay: Duration::from_millis(20),
};

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// One step of an `ownerOf` lookup
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    Started(TokenId),
    Finished(TokenId),
}

/// Chain reader answering from scripted tables
#[derive(Default)]
pub struct ScriptedChain {
    names: DashMap<Address, String>,
    owners: DashMap<Address, Address>,
    supplies: DashMap<Address, U256>,
    token_owners: DashMap<(Address, TokenId), Address>,
    parked: DashMap<(Address, TokenId), Arc<Notify>>,
    stalled: DashSet<Address>,
    lookups: Mutex<Vec<Lookup>>,
    pub owner_of_calls: AtomicUsize,
}

impl ScriptedChain {
    pub fn set_draw(&self, draw: Address, name: &str, owner: Address) {
        self.names.insert(draw, name.to_string());
        self.owners.insert(draw, owner);
    }

    pub fn set_supply(&self, draw: Address, supply: u64) {
        self.supplies.insert(draw, U256::from(supply));
    }

    pub fn set_token_owner(&self, draw: Address, token: TokenId, owner: Address) {
        self.token_owners.insert((draw, token), owner);
    }

    /// Hold `ownerOf(token)` until the returned handle is notified.
    pub fn park_owner_of(&self, draw: Address, token: TokenId) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.parked.insert((draw, token), gate.clone());
        gate
    }

    /// `name` and `owner` reads for `draw` never complete.
    pub fn stall_reads(&self, draw: Address) {
        self.stalled.insert(draw);
    }

    /// `ownerOf` starts and finishes in the order they happened
    pub fn lookups(&self) -> Vec<Lookup> {
        self.lookups.lock().unwrap().clone()
    }

    async fn stall_if_asked(&self, draw: Address) {
        if self.stalled.contains(&draw) {
            std::future::pending::<()>().await;
        }
    }
}

fn missing(what: &str, draw: Address) -> IndexerError {
    IndexerError::ChainRead(format!("no scripted {what} for {draw:?}"))
}

#[async_trait]
impl ChainReader for ScriptedChain {
    async fn name(&self, draw: Address) -> IndexerResult<String> {
        self.stall_if_asked(draw).await;
        self.names
            .get(&draw)
            .map(|n| n.clone())
            .ok_or_else(|| missing("name", draw))
    }

    async fn owner(&self, draw: Address) -> IndexerResult<Address> {
        self.stall_if_asked(draw).await;
        self.owners
            .get(&draw)
            .map(|o| *o)
            .ok_or_else(|| missing("owner", draw))
    }

    async fn total_supply(&self, draw: Address) -> IndexerResult<U256> {
        self.supplies
            .get(&draw)
            .map(|s| *s)
            .ok_or_else(|| missing("totalSupply", draw))
    }

    async fn owner_of(&self, draw: Address, token: TokenId) -> IndexerResult<Address> {
        self.owner_of_calls.fetch_add(1, Ordering::SeqCst);
        self.lookups.lock().unwrap().push(Lookup::Started(token));
        // Yield so lookups genuinely interleave
        tokio::task::yield_now().await;
        let gate = self.parked.get(&(draw, token)).map(|g| g.clone());
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let owner = self
            .token_owners
            .get(&(draw, token))
            .map(|o| *o)
            .ok_or_else(|| missing("ownerOf", draw));
        self.lookups.lock().unwrap().push(Lookup::Finished(token));
        owner
    }
}

/// Everything behind the dispatcher, backed by in-memory doubles
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub chain: Arc<ScriptedChain>,
    pub ledger: Arc<Ledger>,
    pub sequencer: Arc<EntitySequencer>,
    pub clock: Arc<ManualClock>,
    pub pipeline: Arc<CommitmentPipeline>,
    pub announcer: Arc<WinnerAnnouncer>,
    pub dispatcher: Dispatcher,
    pub factories: FactoryAddresses,
    next_tx: AtomicU64,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(
            Arc::new(MemoryStore::new()),
            Arc::new(Ledger::in_memory().await.unwrap()),
        )
    }

    pub fn build(store: Arc<MemoryStore>, ledger: Arc<Ledger>) -> Self {
        let chain = Arc::new(ScriptedChain::default());
        let sequencer = Arc::new(EntitySequencer::new());
        let clock = Arc::new(ManualClock::new(NOW_MS));
        let record_store: Arc<dyn RecordStore> = store.clone();
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let pipeline = Arc::new(CommitmentPipeline::new(
            record_store.clone(),
            ledger.clone(),
            sequencer.clone(),
            dyn_clock.clone(),
            TIMINGS,
        ));
        let announcer = Arc::new(WinnerAnnouncer::new("https://assets.test", 20));
        let reconciler = Arc::new(Reconciler::new(
            record_store,
            chain.clone(),
            pipeline.clone(),
            announcer.clone(),
            dyn_clock,
        ));
        let factories = FactoryAddresses::production();
        let dispatcher =
            Dispatcher::new(factories, ledger.clone(), sequencer.clone(), reconciler);

        Self {
            store,
            chain,
            ledger,
            sequencer,
            clock,
            pipeline,
            announcer,
            dispatcher,
            factories,
            next_tx: AtomicU64::new(1),
        }
    }

    /// Wrap an event as a factory log with a fresh transaction hash.
    pub fn log<E: SolEvent>(&self, family: Family, event: &E) -> RawLog {
        let n = self.next_tx.fetch_add(1, Ordering::SeqCst);
        let data = event.encode_log_data();
        RawLog {
            address: match family {
                Family::Raffle => self.factories.raffle,
                Family::Giveaway => self.factories.giveaway,
            },
            topics: data.topics().to_vec(),
            data: data.data,
            meta: LogMeta {
                block_number: 3_725_000 + n,
                transaction_hash: B256::left_padding_from(&n.to_be_bytes()),
                log_index: 0,
            },
        }
    }

    /// Dispatch a log and wait for its handler to finish.
    pub async fn deliver(&self, draw: Address, log: RawLog) -> Dispatch {
        let outcome = self.dispatcher.dispatch(log).await.unwrap();
        self.sequencer.flush(draw).await;
        outcome
    }

    pub async fn emit<E: SolEvent>(&self, family: Family, draw: Address, event: &E) -> Dispatch {
        let log = self.log(family, event);
        self.deliver(draw, log).await
    }
}

/// Poll `check` until it holds, panicking after two seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
