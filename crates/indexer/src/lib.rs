//! Raffle and giveaway indexer
//!
//! Follows the raffle and giveaway factories and keeps the record store in
//! step with the chain.
//!
//! ```text
//! backfill + eth_subscribe
//!    |
//!    v
//! Dispatcher --ledger dedupe--> EntitySequencer (one lane per draw)
//!                                   |
//!                                   v
//!                               Reconciler --> RecordStore (REST)
//!                                   |
//!                                   v
//!                           CommitmentPipeline (giveaway whitelist root,
//!                                               then winner proofs)
//! ```

pub mod announcer;
pub mod chain;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod reconciler;
pub mod sequencer;
pub mod server;
pub mod source;
pub mod store;

use std::sync::Arc;

pub use announcer::WinnerAnnouncer;
pub use chain::{ChainReader, RpcChain};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::IndexerConfig;
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{ErrorClass, IndexerError, IndexerResult};
pub use ledger::Ledger;
pub use pipeline::{CommitmentPipeline, Phase, PipelineTimings, SessionStatus};
pub use reconciler::Reconciler;
pub use sequencer::EntitySequencer;
pub use server::StatusServer;
pub use source::LogSource;
pub use store::{MemoryStore, RecordStore, RestStore};

/// Fully wired indexer
pub struct Indexer {
    config: IndexerConfig,
    chain: Arc<RpcChain>,
    ledger: Arc<Ledger>,
    pipeline: Arc<CommitmentPipeline>,
    dispatcher: Dispatcher,
}

impl Indexer {
    pub async fn new(config: IndexerConfig) -> IndexerResult<Self> {
        config.validate()?;

        let store: Arc<dyn RecordStore> =
            Arc::new(RestStore::new(config.store_url.clone(), &config.api_key));
        let chain = Arc::new(RpcChain::new(config.rpc_url.clone()));
        let ledger = Arc::new(Ledger::new(&config.database_url()).await?);
        let sequencer = Arc::new(EntitySequencer::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let pipeline = Arc::new(CommitmentPipeline::new(
            store.clone(),
            ledger.clone(),
            sequencer.clone(),
            clock.clone(),
            PipelineTimings {
                proof_delay: config.proof_delay,
                min_root_delay: config.min_root_delay,
            },
        ));
        let announcer = Arc::new(WinnerAnnouncer::new(
            &config.asset_base_url,
            config.asset_count,
        ));
        let reconciler = Arc::new(Reconciler::new(
            store,
            chain.clone(),
            pipeline.clone(),
            announcer,
            clock,
        ));
        let dispatcher = Dispatcher::new(config.factories, ledger.clone(), sequencer, reconciler);

        Ok(Self {
            config,
            chain,
            ledger,
            pipeline,
            dispatcher,
        })
    }

    pub fn pipeline(&self) -> Arc<CommitmentPipeline> {
        self.pipeline.clone()
    }

    /// Block to resume from: the lowest unfinished event of an earlier run,
    /// else the ledger cursor, never before the configured start. Call once
    /// at start-up.
    pub async fn resume_block(&self) -> IndexerResult<u64> {
        self.ledger.resume_block(self.config.start_block).await
    }

    /// Run until the log source closes or the status server fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let restored = self.pipeline.restore().await?;
        if restored > 0 {
            tracing::info!("Restored {} pending commitments", restored);
        }

        let from_block = self.resume_block().await?;
        tracing::info!("Resuming from block {}", from_block);

        let source = LogSource::new(
            self.chain.clone(),
            self.config.ws_url(),
            self.config.factories.all().to_vec(),
            self.config.batch_size,
            self.config.reconnect_delay,
        );
        let (logs, source_task) = source.spawn(from_block);

        let status = StatusServer::new(self.pipeline.clone());
        let listen = self.config.listen.clone();

        tokio::select! {
            _ = self.dispatcher.run(logs) => {}
            result = status.run(&listen) => result?,
        }
        source_task.abort();
        Ok(())
    }
}
