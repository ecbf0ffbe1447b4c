//! Draw state machine
//!
//! Each operation turns the current record plus an event payload into the
//! partial update to write. Status only moves OPEN -> RAFFLED or
//! OPEN -> CANCELED; once terminal, only withdrawal tracking changes.

use alloy_primitives::{Address, B256, U256};
use thiserror::Error;

use crate::prizes::{PrizeError, PrizeTerms};
use crate::records::{DrawRecord, DrawStatus, DrawUpdate, TreasuryType};
use crate::TokenId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("draw {draw} is {status}, expected OPEN")]
    NotOpen { draw: Address, status: DrawStatus },

    #[error("draw {draw} is canceled")]
    Canceled { draw: Address },

    #[error("draw {draw} already committed to root {root}")]
    RootAlreadyPublished { draw: Address, root: B256 },

    #[error("{player} is not a winner of draw {draw}")]
    WinnerNotFound { draw: Address, player: Address },

    #[error("draw {draw} has {winners} winners for {tokens} prize tokens")]
    WinnerTokenMismatch {
        draw: Address,
        winners: usize,
        tokens: usize,
    },

    #[error(transparent)]
    Prize(#[from] PrizeError),
}

/// Winners resolved for every prize token, in event order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedWinners {
    pub grand: Vec<(Address, TokenId)>,
    pub minor: Vec<(Address, TokenId)>,
}

impl DrawRecord {
    pub fn terms(&self) -> PrizeTerms {
        PrizeTerms {
            grand_margin: self.grand_prize_margin,
            minor_margin: self.minor_prize_margin,
            num_grand_wins: self.num_grand_wins,
            num_bonus_wins: self.num_bonus_wins,
        }
    }

    pub fn ensure_open(&self) -> Result<(), LifecycleError> {
        if self.status.is_terminal() {
            return Err(LifecycleError::NotOpen {
                draw: self.draw_id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Owner funded the draw with `amount`.
    pub fn charge(&self, amount: U256, owner: Address) -> Result<DrawUpdate, LifecycleError> {
        self.ensure_open()?;
        let prizes = self.terms().compute(amount)?;

        Ok(DrawUpdate {
            owner_wallet: Some(owner),
            treasury: Some(prizes.treasury),
            grand_prize: Some(prizes.grand_prize),
            minor_prize: Some(prizes.minor_prize),
            owner_charged: Some(true),
            ..Default::default()
        })
    }

    /// Ticket supply changed. `None` when nothing needs to be written: fixed
    /// treasuries never follow supply, and an unchanged treasury is skipped.
    pub fn resupply(&self, total_supply: U256) -> Result<Option<DrawUpdate>, LifecycleError> {
        self.ensure_open()?;
        if self.treasury_type != TreasuryType::DynamicSupply {
            return Ok(None);
        }

        let prizes = self.terms().compute_dynamic(total_supply, self.entry_fee)?;
        if prizes.treasury == self.treasury {
            return Ok(None);
        }

        Ok(Some(DrawUpdate {
            treasury: Some(prizes.treasury),
            grand_prize: Some(prizes.grand_prize),
            minor_prize: Some(prizes.minor_prize),
            ..Default::default()
        }))
    }

    pub fn raffle(&self, winners: &ResolvedWinners) -> Result<DrawUpdate, LifecycleError> {
        self.ensure_open()?;
        let (grand_winners, grand_tokens) = winners.grand.iter().copied().unzip();
        let (minor_winners, minor_tokens) = winners.minor.iter().copied().unzip();

        Ok(DrawUpdate {
            status: Some(DrawStatus::Raffled),
            grand_prize_winners: Some(grand_winners),
            grand_prize_tokens: Some(grand_tokens),
            minor_prize_winners: Some(minor_winners),
            minor_prize_tokens: Some(minor_tokens),
            ..Default::default()
        })
    }

    pub fn cancel(&self, now_ms: u64) -> Result<DrawUpdate, LifecycleError> {
        self.ensure_open()?;
        Ok(DrawUpdate {
            status: Some(DrawStatus::Canceled),
            end_timestamp: Some(now_ms),
            ..Default::default()
        })
    }

    pub fn mark_owner_withdrawn(&self) -> DrawUpdate {
        DrawUpdate {
            owner_withdrawed: Some(true),
            ..Default::default()
        }
    }

    /// The root is written once. A draw that raffled before the commitment
    /// fired still gets its root; a canceled one never does.
    pub fn publish_root(&self, root: B256) -> Result<DrawUpdate, LifecycleError> {
        if let Some(existing) = self.root {
            return Err(LifecycleError::RootAlreadyPublished {
                draw: self.draw_id,
                root: existing,
            });
        }
        if self.status == DrawStatus::Canceled {
            return Err(LifecycleError::Canceled { draw: self.draw_id });
        }

        Ok(DrawUpdate {
            root: Some(root),
            ..Default::default()
        })
    }

    /// Prize tokens `player` may withdraw: the first matching position in the
    /// grand list and in the minor list.
    pub fn withdrawal_tokens(&self, player: Address) -> Result<Vec<TokenId>, LifecycleError> {
        let mut tokens = Vec::with_capacity(2);
        for (winners, prize_tokens) in [
            (&self.grand_prize_winners, &self.grand_prize_tokens),
            (&self.minor_prize_winners, &self.minor_prize_tokens),
        ] {
            if let Some(index) = winners.iter().position(|w| *w == player) {
                let token = prize_tokens.get(index).copied().ok_or(
                    LifecycleError::WinnerTokenMismatch {
                        draw: self.draw_id,
                        winners: winners.len(),
                        tokens: prize_tokens.len(),
                    },
                )?;
                tokens.push(token);
            }
        }

        if tokens.is_empty() {
            return Err(LifecycleError::WinnerNotFound {
                draw: self.draw_id,
                player,
            });
        }
        Ok(tokens)
    }

    /// All `(winner, token)` pairs, grand prizes first.
    pub fn winner_pairs(&self) -> Result<Vec<(Address, TokenId)>, LifecycleError> {
        let mut pairs = Vec::new();
        for (winners, tokens) in [
            (&self.grand_prize_winners, &self.grand_prize_tokens),
            (&self.minor_prize_winners, &self.minor_prize_tokens),
        ] {
            if winners.len() != tokens.len() {
                return Err(LifecycleError::WinnerTokenMismatch {
                    draw: self.draw_id,
                    winners: winners.len(),
                    tokens: tokens.len(),
                });
            }
            pairs.extend(winners.iter().copied().zip(tokens.iter().copied()));
        }
        Ok(pairs)
    }
}
