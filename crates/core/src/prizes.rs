//! Prize fund arithmetic
//!
//! All amounts are token base units. Every division floors, so the sum paid
//! out to winners never exceeds the treasury:
//!
//! ```text
//! treasury    = amount * (grand_margin + minor_margin) / 100
//! grand_prize = (amount * grand_margin / 100) / num_grand_wins
//! minor_prize = (amount * minor_margin / 100) / num_bonus_wins
//! ```

use alloy_primitives::U256;
use thiserror::Error;

/// Margins are whole percentages of the charged amount
pub const MARGIN_DENOMINATOR: u64 = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrizeError {
    #[error("number of grand prize wins must be positive")]
    ZeroGrandWins,

    #[error("number of bonus wins must be positive")]
    ZeroBonusWins,

    #[error("prize margins {grand}% + {minor}% exceed 100%")]
    MarginsExceedTotal { grand: u8, minor: u8 },

    #[error("prize arithmetic overflowed")]
    Overflow,
}

/// Prize split for one draw
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrizeBreakdown {
    /// Amount paid to each grand prize winner
    pub grand_prize: U256,
    /// Amount paid to each minor (bonus) prize winner
    pub minor_prize: U256,
    /// Prize-eligible part of the charged amount
    pub treasury: U256,
}

/// Margins and winner counts of a draw, as announced at creation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrizeTerms {
    pub grand_margin: u8,
    pub minor_margin: u8,
    pub num_grand_wins: u64,
    pub num_bonus_wins: u64,
}

impl PrizeTerms {
    /// Reject terms that would divide by zero or pay out more than was charged.
    pub fn validate(&self) -> Result<(), PrizeError> {
        if self.num_grand_wins == 0 {
            return Err(PrizeError::ZeroGrandWins);
        }
        if self.num_bonus_wins == 0 {
            return Err(PrizeError::ZeroBonusWins);
        }
        if u64::from(self.grand_margin) + u64::from(self.minor_margin) > MARGIN_DENOMINATOR {
            return Err(PrizeError::MarginsExceedTotal {
                grand: self.grand_margin,
                minor: self.minor_margin,
            });
        }
        Ok(())
    }

    /// Split a charged amount (fixed treasury type).
    pub fn compute(&self, amount: U256) -> Result<PrizeBreakdown, PrizeError> {
        self.validate()?;

        let hundred = U256::from(MARGIN_DENOMINATOR);
        let share = |margin: u64| -> Result<U256, PrizeError> {
            amount
                .checked_mul(U256::from(margin))
                .map(|v| v / hundred)
                .ok_or(PrizeError::Overflow)
        };

        let grand_pool = share(u64::from(self.grand_margin))?;
        let minor_pool = share(u64::from(self.minor_margin))?;
        let treasury = share(u64::from(self.grand_margin) + u64::from(self.minor_margin))?;

        Ok(PrizeBreakdown {
            grand_prize: grand_pool / U256::from(self.num_grand_wins),
            minor_prize: minor_pool / U256::from(self.num_bonus_wins),
            treasury,
        })
    }

    /// Split the funds of a dynamic-supply draw: `total_supply * entry_fee`.
    pub fn compute_dynamic(
        &self,
        total_supply: U256,
        entry_fee: U256,
    ) -> Result<PrizeBreakdown, PrizeError> {
        let amount = total_supply
            .checked_mul(entry_fee)
            .ok_or(PrizeError::Overflow)?;
        self.compute(amount)
    }
}

/// Free-function form of [`PrizeTerms::compute`].
pub fn compute_prizes(
    amount: U256,
    grand_margin: u8,
    minor_margin: u8,
    num_grand_wins: u64,
    num_bonus_wins: u64,
) -> Result<PrizeBreakdown, PrizeError> {
    PrizeTerms {
        grand_margin,
        minor_margin,
        num_grand_wins,
        num_bonus_wins,
    }
    .compute(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_split() {
        // 50% grand over 2 winners, 10% minor over 1 winner, 1000 charged
        let prizes = compute_prizes(U256::from(1000u64), 50, 10, 2, 1).unwrap();
        assert_eq!(prizes.treasury, U256::from(600u64));
        assert_eq!(prizes.grand_prize, U256::from(250u64));
        assert_eq!(prizes.minor_prize, U256::from(100u64));
    }

    #[test]
    fn test_floor_division() {
        let prizes = compute_prizes(U256::from(999u64), 33, 33, 7, 4).unwrap();
        // 999 * 66 / 100 = 659.34
        assert_eq!(prizes.treasury, U256::from(659u64));
        // 999 * 33 / 100 = 329 ; 329 / 7 = 47
        assert_eq!(prizes.grand_prize, U256::from(47u64));
        // 329 / 4 = 82
        assert_eq!(prizes.minor_prize, U256::from(82u64));
    }

    #[test]
    fn test_zero_win_counts_rejected() {
        assert_eq!(
            compute_prizes(U256::from(10u64), 50, 10, 0, 1),
            Err(PrizeError::ZeroGrandWins)
        );
        assert_eq!(
            compute_prizes(U256::from(10u64), 50, 10, 1, 0),
            Err(PrizeError::ZeroBonusWins)
        );
    }

    #[test]
    fn test_margins_over_hundred_rejected() {
        let err = compute_prizes(U256::from(10u64), 70, 40, 1, 1).unwrap_err();
        assert_eq!(err, PrizeError::MarginsExceedTotal { grand: 70, minor: 40 });
    }

    #[test]
    fn test_overflow_is_reported() {
        let err = compute_prizes(U256::MAX, 50, 10, 1, 1).unwrap_err();
        assert_eq!(err, PrizeError::Overflow);
    }

    #[test]
    fn test_dynamic_supply() {
        let terms = PrizeTerms {
            grand_margin: 50,
            minor_margin: 10,
            num_grand_wins: 2,
            num_bonus_wins: 1,
        };
        // 100 tickets at 10 each = 1000
        let prizes = terms
            .compute_dynamic(U256::from(100u64), U256::from(10u64))
            .unwrap();
        assert_eq!(prizes, terms.compute(U256::from(1000u64)).unwrap());
    }

    #[test]
    fn test_payout_never_exceeds_treasury() {
        for amount in [0u64, 1, 7, 99, 100, 101, 1234, 99_999, 1_000_003] {
            for grand in (0u8..=100).step_by(7) {
                for minor in (0u8..=(100 - grand)).step_by(9) {
                    for wins in [1u64, 2, 3, 13] {
                        for bonus in [1u64, 4, 11] {
                            let p = compute_prizes(U256::from(amount), grand, minor, wins, bonus)
                                .unwrap();
                            let paid = p.grand_prize * U256::from(wins)
                                + p.minor_prize * U256::from(bonus);
                            assert!(
                                paid <= p.treasury,
                                "overspend: amount={amount} margins={grand}/{minor} wins={wins}/{bonus}"
                            );
                        }
                    }
                }
            }
        }
    }
}
