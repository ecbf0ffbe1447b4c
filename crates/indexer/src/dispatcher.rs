//! Routes decoded logs onto per-draw sequencer lanes

use std::sync::Arc;

use raffle_sync_contracts::{decode_log, FactoryAddresses, RawLog};
use tokio::sync::mpsc;

use crate::error::IndexerResult;
use crate::ledger::Ledger;
use crate::reconciler::Reconciler;
use crate::sequencer::EntitySequencer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Handed to the draw's lane
    Queued,
    /// Not an event we handle
    Ignored,
    /// Already processed
    Duplicate,
}

pub struct Dispatcher {
    factories: FactoryAddresses,
    ledger: Arc<Ledger>,
    sequencer: Arc<EntitySequencer>,
    reconciler: Arc<Reconciler>,
}

impl Dispatcher {
    pub fn new(
        factories: FactoryAddresses,
        ledger: Arc<Ledger>,
        sequencer: Arc<EntitySequencer>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            factories,
            ledger,
            sequencer,
            reconciler,
        }
    }

    pub async fn dispatch(&self, log: RawLog) -> IndexerResult<Dispatch> {
        let Some(family) = self.factories.family_of(log.address) else {
            tracing::debug!("Ignoring log from unknown emitter {:?}", log.address);
            return Ok(Dispatch::Ignored);
        };
        let Some(event) = decode_log(family, &log)? else {
            tracing::debug!("Ignoring unrecognized {} event {:?}", family, log.topic0());
            return Ok(Dispatch::Ignored);
        };

        if !self.ledger.record_event(&log.meta).await? {
            tracing::debug!(
                "Dropping redelivered {} {}/{}",
                event.name(),
                log.meta.transaction_hash,
                log.meta.log_index
            );
            return Ok(Dispatch::Duplicate);
        }
        self.ledger.advance_cursor(log.meta.block_number).await?;

        let draw = event.draw();
        tracing::debug!(
            "Dispatching {} for {} {:?} at block {}",
            event.name(),
            family,
            draw,
            log.meta.block_number
        );
        let reconciler = self.reconciler.clone();
        let ledger = self.ledger.clone();
        let meta = log.meta;
        self.sequencer.submit(draw, async move {
            let name = event.name();
            if let Err(e) = reconciler.apply(family, event).await {
                e.log_failure(name, draw);
            }
            // Until here the claim is pending and is replayed after a restart
            if let Err(e) = ledger.complete_event(&meta).await {
                e.log_failure("ledger", draw);
            }
        });
        Ok(Dispatch::Queued)
    }

    /// Dispatch until the source closes.
    pub async fn run(&self, mut logs: mpsc::UnboundedReceiver<RawLog>) {
        while let Some(log) = logs.recv().await {
            let emitter = log.address;
            if let Err(e) = self.dispatch(log).await {
                e.log_failure("dispatch", emitter);
            }
        }
        tracing::info!("Log source closed");
    }
}
