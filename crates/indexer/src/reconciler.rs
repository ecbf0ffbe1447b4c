//! Event handlers
//!
//! Every handler reads the current record, derives the partial update from
//! the core state machine and writes it back. Handlers for one draw never
//! interleave, the sequencer runs them one at a time.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use futures_util::future::join_all;
use raffle_sync_contracts::{DrawCreated, DrawEvent};
use raffle_sync_core::{
    DrawRecord, Family, Registration, ResolvedWinners, TokenId, TreasuryType, Withdrawal,
    EMERGENCY_TOKEN_ID,
};

use crate::announcer::WinnerAnnouncer;
use crate::chain::ChainReader;
use crate::clock::Clock;
use crate::error::{IndexerError, IndexerResult};
use crate::pipeline::CommitmentPipeline;
use crate::store::RecordStore;

pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    chain: Arc<dyn ChainReader>,
    pipeline: Arc<CommitmentPipeline>,
    announcer: Arc<WinnerAnnouncer>,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        chain: Arc<dyn ChainReader>,
        pipeline: Arc<CommitmentPipeline>,
        announcer: Arc<WinnerAnnouncer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            chain,
            pipeline,
            announcer,
            clock,
        }
    }

    pub async fn apply(&self, family: Family, event: DrawEvent) -> IndexerResult<()> {
        match event {
            DrawEvent::Created(created) => self.on_created(family, created).await,
            DrawEvent::OwnerCharged {
                draw,
                amount,
                owner,
            } => self.on_owner_charged(family, draw, amount, owner).await,
            DrawEvent::PlayerJoined { draw, player } => {
                self.on_player_joined(family, draw, player).await
            }
            DrawEvent::PrizeRaffled {
                draw,
                grand_tokens,
                minor_tokens,
            } => {
                self.on_prize_raffled(family, draw, &grand_tokens, &minor_tokens)
                    .await
            }
            DrawEvent::Canceled { draw } => self.on_canceled(family, draw).await,
            DrawEvent::PrizeWithdrawed { draw, player } => {
                self.on_prize_withdrawed(family, draw, player).await
            }
            DrawEvent::OwnerWithdrawed { draw } => self.on_owner_withdrawed(family, draw).await,
            DrawEvent::EmergencyWithdrawed { draw, player } => {
                self.on_emergency_withdrawed(family, draw, player).await
            }
        }
    }

    async fn load(&self, family: Family, draw: Address) -> IndexerResult<DrawRecord> {
        self.store
            .get_draw(family, draw)
            .await?
            .ok_or(IndexerError::DrawNotFound(draw))
    }

    async fn on_created(&self, family: Family, created: DrawCreated) -> IndexerResult<()> {
        let draw = created.draw;
        if self.store.get_draw(family, draw).await?.is_some() {
            return Err(IndexerError::DrawExists(draw));
        }

        let (name, owner) = match family {
            Family::Raffle => tokio::try_join!(self.chain.name(draw), self.chain.owner(draw))?,
            // OwnerCharged fills in the owner later
            Family::Giveaway => {
                let (name, owner) = tokio::join!(self.chain.name(draw), self.chain.owner(draw));
                let name = name.unwrap_or_else(|e| {
                    tracing::warn!("Name read failed for giveaway {:?}: {}", draw, e);
                    String::new()
                });
                (name, owner.unwrap_or(Address::ZERO))
            }
        };
        let record = created.into_record(name, owner);
        self.store.create_draw(family, &record).await?;

        tracing::info!("Created {} {:?} ({})", family, draw, record.name);
        Ok(())
    }

    async fn on_owner_charged(
        &self,
        family: Family,
        draw: Address,
        amount: U256,
        owner: Address,
    ) -> IndexerResult<()> {
        let mut record = self.load(family, draw).await?;
        let update = record.charge(amount, owner)?;
        self.store.update_draw(family, draw, &update).await?;
        tracing::info!(
            "Charged {} {:?} with {}: treasury {}, grand prize {}, minor prize {}",
            family,
            draw,
            amount,
            update.treasury.unwrap_or_default(),
            update.grand_prize.unwrap_or_default(),
            update.minor_prize.unwrap_or_default()
        );

        if family == Family::Giveaway {
            update.apply_to(&mut record);
            self.pipeline.schedule_root(&record).await?;
        }
        Ok(())
    }

    async fn on_player_joined(
        &self,
        family: Family,
        draw: Address,
        player: Address,
    ) -> IndexerResult<()> {
        let record = self.load(family, draw).await?;
        record.ensure_open()?;

        if family == Family::Giveaway {
            if let Some(root) = self.pipeline.frozen_root(draw).or(record.root) {
                return Err(IndexerError::RegistrationFrozen {
                    giveaway: draw,
                    root,
                });
            }
        }

        let registration = Registration {
            wallet: player,
            draw_id: draw,
            social_link: None,
        };
        self.store.add_registration(family, &registration).await?;
        tracing::info!("Registered {:?} in {} {:?}", player, family, draw);

        if record.treasury_type != TreasuryType::DynamicSupply {
            return Ok(());
        }
        let total_supply = self.chain.total_supply(draw).await?;
        match record.resupply(total_supply)? {
            Some(update) => {
                self.store.update_draw(family, draw, &update).await?;
                tracing::info!(
                    "Treasury of {:?} follows supply {}: {}",
                    draw,
                    total_supply,
                    update.treasury.unwrap_or_default()
                );
            }
            None => tracing::debug!("Treasury of {:?} unchanged at supply {}", draw, total_supply),
        }
        Ok(())
    }

    async fn on_prize_raffled(
        &self,
        family: Family,
        draw: Address,
        grand_tokens: &[TokenId],
        minor_tokens: &[TokenId],
    ) -> IndexerResult<()> {
        let mut record = self.load(family, draw).await?;
        record.ensure_open()?;

        let winners = match family {
            Family::Raffle => self.resolve_owners(draw, grand_tokens, minor_tokens).await?,
            Family::Giveaway => self.resolve_registrants(draw, grand_tokens, minor_tokens).await?,
        };
        let update = record.raffle(&winners)?;
        self.store.update_draw(family, draw, &update).await?;
        update.apply_to(&mut record);
        tracing::info!(
            "Raffled {} {:?}: {} grand and {} minor winners",
            family,
            draw,
            winners.grand.len(),
            winners.minor.len()
        );

        self.announcer.announce(self.store.as_ref(), &record).await;
        if family == Family::Giveaway {
            self.pipeline.winners_resolved(draw);
        }
        Ok(())
    }

    /// Token owners from the NFT contract. Every grand lookup completes
    /// before any minor lookup starts.
    async fn resolve_owners(
        &self,
        draw: Address,
        grand_tokens: &[TokenId],
        minor_tokens: &[TokenId],
    ) -> IndexerResult<ResolvedWinners> {
        let grand = self.owners_of(draw, grand_tokens).await?;
        let minor = self.owners_of(draw, minor_tokens).await?;
        Ok(ResolvedWinners { grand, minor })
    }

    async fn owners_of(
        &self,
        draw: Address,
        tokens: &[TokenId],
    ) -> IndexerResult<Vec<(Address, TokenId)>> {
        let lookups = tokens.iter().map(|token| self.chain.owner_of(draw, *token));
        let owners = join_all(lookups)
            .await
            .into_iter()
            .collect::<IndexerResult<Vec<Address>>>()?;
        Ok(owners.into_iter().zip(tokens.iter().copied()).collect())
    }

    /// Registrants by 1-based registration position
    async fn resolve_registrants(
        &self,
        draw: Address,
        grand_tokens: &[TokenId],
        minor_tokens: &[TokenId],
    ) -> IndexerResult<ResolvedWinners> {
        let registrations = self.store.registrations(Family::Giveaway, draw).await?;
        let lookup = |tokens: &[TokenId]| -> IndexerResult<Vec<(Address, TokenId)>> {
            tokens
                .iter()
                .map(|&token| {
                    token
                        .checked_sub(1)
                        .and_then(|index| registrations.get(index as usize))
                        .map(|r| (r.wallet, token))
                        .ok_or(IndexerError::UnknownRegistrant {
                            giveaway: draw,
                            token,
                        })
                })
                .collect()
        };
        Ok(ResolvedWinners {
            grand: lookup(grand_tokens)?,
            minor: lookup(minor_tokens)?,
        })
    }

    async fn on_canceled(&self, family: Family, draw: Address) -> IndexerResult<()> {
        let record = self.load(family, draw).await?;
        let update = record.cancel(self.clock.now_ms())?;
        if family == Family::Giveaway && self.pipeline.cancel(draw).await {
            tracing::info!("Dropped pending commitment for canceled giveaway {:?}", draw);
        }
        self.store.update_draw(family, draw, &update).await?;
        tracing::info!("Canceled {} {:?}", family, draw);
        Ok(())
    }

    async fn on_prize_withdrawed(
        &self,
        family: Family,
        draw: Address,
        player: Address,
    ) -> IndexerResult<()> {
        let record = self.load(family, draw).await?;
        for token_id in record.withdrawal_tokens(player)? {
            let withdrawal = Withdrawal {
                wallet: player,
                draw_id: draw,
                token_id,
            };
            self.store.add_withdrawal(family, &withdrawal).await?;
            tracing::info!("{:?} withdrew prize token {} of {:?}", player, token_id, draw);
        }
        Ok(())
    }

    async fn on_owner_withdrawed(&self, family: Family, draw: Address) -> IndexerResult<()> {
        let record = self.load(family, draw).await?;
        self.store
            .update_draw(family, draw, &record.mark_owner_withdrawn())
            .await?;
        tracing::info!("Owner withdrew from {} {:?}", family, draw);
        Ok(())
    }

    async fn on_emergency_withdrawed(
        &self,
        family: Family,
        draw: Address,
        player: Address,
    ) -> IndexerResult<()> {
        let withdrawal = Withdrawal {
            wallet: player,
            draw_id: draw,
            token_id: EMERGENCY_TOKEN_ID,
        };
        self.store.add_withdrawal(family, &withdrawal).await?;
        tracing::info!("{:?} made an emergency withdrawal from {:?}", player, draw);
        Ok(())
    }
}
