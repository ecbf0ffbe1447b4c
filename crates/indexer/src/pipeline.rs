//! Giveaway whitelist commitment
//!
//! Each giveaway gets a [`CommitmentSession`] once it is charged:
//!
//! ```text
//! Scheduled --root generation--> Committed --proof generation--> (disposed)
//!     |                              |
//!     +--------- canceled -----------+--> (disposed)
//! ```
//!
//! Root generation snapshots the registry, publishes the Merkle root and
//! keeps the tree. Proof generation posts one membership proof per winner
//! against that same tree. Registration for the giveaway is frozen from the
//! moment the root is built. Both phases run on the giveaway's sequencer
//! lane and re-read the record before acting.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use dashmap::{mapref::entry::Entry, DashMap};
use raffle_sync_core::{DrawRecord, DrawStatus, Family, ProofRecord, Whitelist};
use serde::Serialize;
use tokio::task::AbortHandle;

use crate::clock::Clock;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::{Ledger, ScheduledCommitment};
use crate::sequencer::EntitySequencer;
use crate::store::RecordStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    RootGeneration,
    ProofGeneration,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::RootGeneration => "root_generation",
            Phase::ProofGeneration => "proof_generation",
        }
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "root_generation" => Ok(Phase::RootGeneration),
            "proof_generation" => Ok(Phase::ProofGeneration),
            other => Err(format!("unknown commitment phase {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineTimings {
    /// From root publication to proof generation
    pub proof_delay: Duration,
    /// Floor for the root generation timer
    pub min_root_delay: Duration,
}

impl Default for PipelineTimings {
    fn default() -> Self {
        Self {
            proof_delay: crate::config::DEFAULT_PROOF_DELAY,
            min_root_delay: crate::config::DEFAULT_MIN_ROOT_DELAY,
        }
    }
}

enum SessionState {
    Scheduled,
    Committed {
        whitelist: Arc<Whitelist>,
        /// Proof generation fired before the draw was raffled
        awaiting_winners: bool,
    },
}

pub struct CommitmentSession {
    state: SessionState,
    due_ms: Option<u64>,
    /// Proof generation deadline carried over a restart
    proof_due_ms: Option<u64>,
    timer: Option<AbortHandle>,
}

impl CommitmentSession {
    fn whitelist(&self) -> Option<Arc<Whitelist>> {
        match &self.state {
            SessionState::Committed { whitelist, .. } => Some(whitelist.clone()),
            SessionState::Scheduled => None,
        }
    }

    fn status(&self, giveaway: Address) -> SessionStatus {
        let (phase, registrants, root) = match &self.state {
            SessionState::Scheduled => ("scheduled", 0, None),
            SessionState::Committed {
                whitelist,
                awaiting_winners,
            } => (
                if *awaiting_winners {
                    "awaiting_winners"
                } else {
                    "committed"
                },
                whitelist.len(),
                Some(whitelist.root()),
            ),
        };
        SessionStatus {
            giveaway,
            phase,
            registrants,
            root,
            due_ms: self.due_ms,
        }
    }
}

/// Snapshot of a live session
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub giveaway: Address,
    pub phase: &'static str,
    pub registrants: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_ms: Option<u64>,
}

pub struct CommitmentPipeline {
    store: Arc<dyn RecordStore>,
    ledger: Arc<Ledger>,
    sequencer: Arc<EntitySequencer>,
    clock: Arc<dyn Clock>,
    timings: PipelineTimings,
    sessions: DashMap<Address, CommitmentSession>,
}

impl CommitmentPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        ledger: Arc<Ledger>,
        sequencer: Arc<EntitySequencer>,
        clock: Arc<dyn Clock>,
        timings: PipelineTimings,
    ) -> Self {
        Self {
            store,
            ledger,
            sequencer,
            clock,
            timings,
            sessions: DashMap::new(),
        }
    }

    /// Time until root generation for a giveaway ending at `end_timestamp_ms`
    pub fn root_delay(&self, end_timestamp_ms: u64) -> Duration {
        let remaining = end_timestamp_ms.saturating_sub(self.clock.now_ms());
        Duration::from_millis(remaining).max(self.timings.min_root_delay)
    }

    /// Start a session for a charged giveaway. Returns `false` when one
    /// already exists or the giveaway is already committed.
    pub async fn schedule_root(self: &Arc<Self>, record: &DrawRecord) -> IndexerResult<bool> {
        let giveaway = record.draw_id;
        if record.root.is_some() {
            tracing::debug!("Giveaway {:?} already has a root, nothing to schedule", giveaway);
            return Ok(false);
        }

        let delay = self.root_delay(record.end_timestamp);
        let due_ms = self.clock.now_ms() + delay.as_millis() as u64;
        match self.sessions.entry(giveaway) {
            Entry::Occupied(_) => {
                tracing::debug!("Root generation for giveaway {:?} already scheduled", giveaway);
                return Ok(false);
            }
            Entry::Vacant(slot) => {
                slot.insert(CommitmentSession {
                    state: SessionState::Scheduled,
                    due_ms: Some(due_ms),
                    proof_due_ms: None,
                    timer: Some(self.arm(giveaway, Phase::RootGeneration, delay)),
                });
            }
        }

        self.ledger
            .save_schedule(&ScheduledCommitment {
                giveaway,
                phase: Phase::RootGeneration,
                due_ms,
            })
            .await?;
        tracing::info!(
            "Scheduled root generation for giveaway {:?} in {:?}",
            giveaway,
            delay
        );
        Ok(true)
    }

    /// Start a timer that queues `phase` on the giveaway's lane.
    fn arm(self: &Arc<Self>, giveaway: Address, phase: Phase, delay: Duration) -> AbortHandle {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let sequencer = pipeline.sequencer.clone();
            sequencer.submit(giveaway, pipeline.fire(giveaway, phase));
        })
        .abort_handle()
    }

    async fn fire(self: Arc<Self>, giveaway: Address, phase: Phase) {
        let result = match phase {
            Phase::RootGeneration => self.run_phase_one(giveaway).await.map(drop),
            Phase::ProofGeneration => self.run_phase_two(giveaway).await.map(drop),
        };
        if let Err(e) = result {
            e.log_failure(phase.as_str(), giveaway);
        }
    }

    /// Build and publish the whitelist root. `None` when the session is gone
    /// or the giveaway was canceled. Any failure disposes the session.
    pub async fn run_phase_one(self: &Arc<Self>, giveaway: Address) -> IndexerResult<Option<B256>> {
        let scheduled = self
            .sessions
            .get(&giveaway)
            .map(|s| matches!(s.state, SessionState::Scheduled));
        match scheduled {
            Some(true) => {}
            Some(false) => {
                tracing::debug!("Giveaway {:?} is already committed", giveaway);
                return Ok(None);
            }
            None => {
                tracing::debug!("No pending commitment for giveaway {:?}", giveaway);
                return Ok(None);
            }
        }

        match self.commit(giveaway).await {
            Ok(root) => Ok(root),
            Err(e) => {
                self.cancel(giveaway).await;
                Err(e)
            }
        }
    }

    async fn commit(self: &Arc<Self>, giveaway: Address) -> IndexerResult<Option<B256>> {
        let record = self
            .store
            .get_draw(Family::Giveaway, giveaway)
            .await?
            .ok_or(IndexerError::DrawNotFound(giveaway))?;
        if record.status == DrawStatus::Canceled {
            tracing::info!("Giveaway {:?} was canceled, dropping its commitment", giveaway);
            self.cancel(giveaway).await;
            return Ok(None);
        }

        let registrations = self.store.registrations(Family::Giveaway, giveaway).await?;
        if registrations.is_empty() {
            return Err(IndexerError::EmptyRegistry(giveaway));
        }
        let whitelist = Whitelist::from_wallets(registrations.iter().map(|r| r.wallet))?;
        let root = whitelist.root();

        match record.root {
            Some(published) if published != root => {
                return Err(IndexerError::RootMismatch {
                    giveaway,
                    published,
                    rebuilt: root,
                });
            }
            Some(_) => tracing::info!(
                "Rebuilt whitelist for giveaway {:?} matches published root {}",
                giveaway,
                root
            ),
            None => {
                let update = record.publish_root(root)?;
                self.store
                    .update_draw(Family::Giveaway, giveaway, &update)
                    .await?;
                tracing::info!(
                    "Published root {} for giveaway {:?} over {} registrants",
                    root,
                    giveaway,
                    whitelist.len()
                );
            }
        }

        let now = self.clock.now_ms();
        let due_ms = {
            let Some(mut session) = self.sessions.get_mut(&giveaway) else {
                return Ok(Some(root));
            };
            let due_ms = session
                .proof_due_ms
                .take()
                .unwrap_or(now + self.timings.proof_delay.as_millis() as u64);
            let delay = Duration::from_millis(due_ms.saturating_sub(now));
            session.state = SessionState::Committed {
                whitelist: Arc::new(whitelist),
                awaiting_winners: false,
            };
            session.due_ms = Some(due_ms);
            session.timer = Some(self.arm(giveaway, Phase::ProofGeneration, delay));
            due_ms
        };

        let entry = ScheduledCommitment {
            giveaway,
            phase: Phase::ProofGeneration,
            due_ms,
        };
        if let Err(e) = self.ledger.save_schedule(&entry).await {
            e.log_failure(Phase::ProofGeneration.as_str(), giveaway);
        }
        Ok(Some(root))
    }

    /// Post a proof for every winner. Returns the number posted.
    ///
    /// A giveaway that is still OPEN keeps its session and waits for
    /// [`CommitmentPipeline::winners_resolved`].
    pub async fn run_phase_two(self: &Arc<Self>, giveaway: Address) -> IndexerResult<usize> {
        let whitelist = match self.sessions.get(&giveaway).map(|s| s.whitelist()) {
            Some(Some(whitelist)) => whitelist,
            Some(None) => {
                return Err(IndexerError::Internal(format!(
                    "proof generation for {:?} before its root",
                    giveaway
                )))
            }
            None => {
                tracing::debug!("No committed whitelist for giveaway {:?}", giveaway);
                return Ok(0);
            }
        };

        match self.prove(giveaway, &whitelist).await {
            Err(IndexerError::WinnersUnresolved(g)) => {
                if let Some(mut session) = self.sessions.get_mut(&giveaway) {
                    session.timer = None;
                    session.due_ms = None;
                    if let SessionState::Committed {
                        awaiting_winners, ..
                    } = &mut session.state
                    {
                        *awaiting_winners = true;
                    }
                }
                Err(IndexerError::WinnersUnresolved(g))
            }
            result => {
                self.cancel(giveaway).await;
                result
            }
        }
    }

    async fn prove(&self, giveaway: Address, whitelist: &Whitelist) -> IndexerResult<usize> {
        let record = self
            .store
            .get_draw(Family::Giveaway, giveaway)
            .await?
            .ok_or(IndexerError::DrawNotFound(giveaway))?;
        match record.status {
            DrawStatus::Canceled => {
                tracing::info!("Giveaway {:?} was canceled, no proofs generated", giveaway);
                return Ok(0);
            }
            DrawStatus::Open => return Err(IndexerError::WinnersUnresolved(giveaway)),
            DrawStatus::Raffled => {}
        }

        let mut posted = 0;
        let mut invalid = Vec::new();
        for (wallet, token_id) in record.winner_pairs()? {
            let proof = match whitelist.proof_for(wallet, token_id) {
                Ok(proof) => proof,
                Err(e) => {
                    invalid.push(IndexerError::from(e));
                    continue;
                }
            };
            let proof = ProofRecord {
                wallet,
                giveaway_id: giveaway,
                proof,
            };
            match self.store.add_proof(&proof).await {
                Ok(()) => posted += 1,
                Err(e) => e.log_failure(Phase::ProofGeneration.as_str(), giveaway),
            }
        }
        tracing::info!("Posted {} proofs for giveaway {:?}", posted, giveaway);

        let mut invalid = invalid.into_iter();
        match invalid.next() {
            Some(first) => {
                for e in invalid {
                    e.log_failure(Phase::ProofGeneration.as_str(), giveaway);
                }
                Err(first)
            }
            None => Ok(posted),
        }
    }

    /// Winners were written for `giveaway`. Runs proof generation right
    /// away if it already fired and found them missing.
    pub fn winners_resolved(self: &Arc<Self>, giveaway: Address) -> bool {
        let resume = self
            .sessions
            .get_mut(&giveaway)
            .map(|mut session| match &mut session.state {
                SessionState::Committed {
                    awaiting_winners, ..
                } if *awaiting_winners => {
                    *awaiting_winners = false;
                    true
                }
                _ => false,
            })
            .unwrap_or(false);

        if resume {
            tracing::info!("Winners resolved for giveaway {:?}, generating proofs", giveaway);
            let pipeline = Arc::clone(self);
            self.sequencer
                .submit(giveaway, pipeline.fire(giveaway, Phase::ProofGeneration));
        }
        resume
    }

    /// Abort any pending timer and drop the session. Returns whether one existed.
    pub async fn cancel(&self, giveaway: Address) -> bool {
        let removed = self.sessions.remove(&giveaway);
        if let Some(timer) = removed.as_ref().and_then(|(_, s)| s.timer.as_ref()) {
            timer.abort();
        }
        if let Err(e) = self.ledger.remove_schedule(giveaway).await {
            e.log_failure("cancel", giveaway);
        }
        removed.is_some()
    }

    /// Root the giveaway's registration is frozen at, if committed
    pub fn frozen_root(&self, giveaway: Address) -> Option<B256> {
        self.sessions
            .get(&giveaway)
            .and_then(|s| s.whitelist())
            .map(|w| w.root())
    }

    pub fn is_pending(&self, giveaway: Address) -> bool {
        self.sessions.contains_key(&giveaway)
    }

    pub fn sessions(&self) -> Vec<SessionStatus> {
        let mut list: Vec<SessionStatus> = self
            .sessions
            .iter()
            .map(|entry| entry.value().status(*entry.key()))
            .collect();
        list.sort_by_key(|s| s.giveaway);
        list
    }

    /// Re-arm every schedule persisted by a previous run.
    ///
    /// A pending proof generation first rebuilds the whitelist, which must
    /// reproduce the published root, then fires at its original deadline.
    pub async fn restore(self: &Arc<Self>) -> IndexerResult<usize> {
        let schedules = self.ledger.schedules().await?;
        let now = self.clock.now_ms();
        let mut restored = 0;

        for entry in schedules {
            let (delay, proof_due_ms) = match entry.phase {
                Phase::RootGeneration => (
                    Duration::from_millis(entry.due_ms.saturating_sub(now))
                        .max(self.timings.min_root_delay),
                    None,
                ),
                Phase::ProofGeneration => (self.timings.min_root_delay, Some(entry.due_ms)),
            };
            if let Entry::Vacant(slot) = self.sessions.entry(entry.giveaway) {
                slot.insert(CommitmentSession {
                    state: SessionState::Scheduled,
                    due_ms: Some(now + delay.as_millis() as u64),
                    proof_due_ms,
                    timer: Some(self.arm(entry.giveaway, Phase::RootGeneration, delay)),
                });
                restored += 1;
            }
        }

        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    async fn pipeline(now_ms: u64) -> CommitmentPipeline {
        CommitmentPipeline::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Ledger::in_memory().await.unwrap()),
            Arc::new(EntitySequencer::new()),
            Arc::new(ManualClock::new(now_ms)),
            PipelineTimings::default(),
        )
    }

    #[tokio::test]
    async fn test_root_delay_waits_until_end() {
        let pipeline = pipeline(1_000_000).await;
        assert_eq!(pipeline.root_delay(1_060_000), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_root_delay_floor() {
        let pipeline = pipeline(1_000_000).await;
        assert_eq!(pipeline.root_delay(999_000), Duration::from_millis(2_000));
        assert_eq!(pipeline.root_delay(1_000_500), Duration::from_millis(2_000));
    }

    #[test]
    fn test_phase_names_roundtrip() {
        for phase in [Phase::RootGeneration, Phase::ProofGeneration] {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("reveal".parse::<Phase>().is_err());
    }
}
