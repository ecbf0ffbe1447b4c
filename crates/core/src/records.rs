//! Records exchanged with the external record store

use std::fmt;

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::decimal;
use crate::TokenId;

/// Token id written to withdrawal records for emergency exits
pub const EMERGENCY_TOKEN_ID: TokenId = 0;

/// Contract family a draw belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Raffle,
    Giveaway,
}

impl Family {
    /// Record store collection name
    pub fn collection(&self) -> &'static str {
        match self {
            Family::Raffle => "raffles",
            Family::Giveaway => "giveaways",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Raffle => f.write_str("raffle"),
            Family::Giveaway => f.write_str("giveaway"),
        }
    }
}

/// Lifecycle status. OPEN moves to exactly one of the terminal states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DrawStatus {
    Open,
    Raffled,
    Canceled,
}

impl DrawStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DrawStatus::Open)
    }
}

impl From<DrawStatus> for u8 {
    fn from(status: DrawStatus) -> Self {
        match status {
            DrawStatus::Open => 0,
            DrawStatus::Raffled => 1,
            DrawStatus::Canceled => 2,
        }
    }
}

impl TryFrom<u8> for DrawStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DrawStatus::Open),
            1 => Ok(DrawStatus::Raffled),
            2 => Ok(DrawStatus::Canceled),
            other => Err(format!("unknown draw status {other}")),
        }
    }
}

impl fmt::Display for DrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawStatus::Open => f.write_str("OPEN"),
            DrawStatus::Raffled => f.write_str("RAFFLED"),
            DrawStatus::Canceled => f.write_str("CANCELED"),
        }
    }
}

/// How the treasury is funded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TreasuryType {
    /// Funds follow the ticket supply: `total_supply * entry_fee`
    DynamicSupply,
    /// Funds are charged directly by the owner
    Fixed,
}

impl From<TreasuryType> for u8 {
    fn from(kind: TreasuryType) -> Self {
        match kind {
            TreasuryType::DynamicSupply => 3,
            TreasuryType::Fixed => 4,
        }
    }
}

impl TryFrom<u8> for TreasuryType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(TreasuryType::DynamicSupply),
            4 => Ok(TreasuryType::Fixed),
            other => Err(format!("unknown treasury type {other}")),
        }
    }
}

/// One raffle or giveaway, keyed by its contract address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub draw_id: Address,
    #[serde(default, deserialize_with = "decimal::null_as_default")]
    pub name: String,
    pub owner_wallet: Address,
    pub status: DrawStatus,
    pub grand_prize_margin: u8,
    pub minor_prize_margin: u8,
    pub num_grand_wins: u64,
    pub num_bonus_wins: u64,
    #[serde(default, with = "decimal")]
    pub entry_fee: U256,
    pub paytoken: Address,
    pub treasury_type: TreasuryType,
    #[serde(default, with = "decimal")]
    pub treasury: U256,
    #[serde(default, with = "decimal")]
    pub grand_prize: U256,
    #[serde(default, with = "decimal")]
    pub minor_prize: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    /// Milliseconds since the epoch
    pub end_timestamp: u64,
    #[serde(default, deserialize_with = "decimal::null_as_default")]
    pub owner_charged: bool,
    #[serde(default, deserialize_with = "decimal::null_as_default")]
    pub owner_withdrawed: bool,
    #[serde(default, deserialize_with = "decimal::null_as_default")]
    pub grand_prize_winners: Vec<Address>,
    #[serde(default, deserialize_with = "decimal::null_as_default")]
    pub grand_prize_tokens: Vec<TokenId>,
    #[serde(default, deserialize_with = "decimal::null_as_default")]
    pub minor_prize_winners: Vec<Address>,
    #[serde(default, deserialize_with = "decimal::null_as_default")]
    pub minor_prize_tokens: Vec<TokenId>,
    /// Whitelist commitment, giveaways only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<B256>,
}

/// Partial update: only `Some` fields are written
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_wallet: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DrawStatus>,
    #[serde(skip_serializing_if = "Option::is_none", with = "decimal::option")]
    pub treasury: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none", with = "decimal::option")]
    pub grand_prize: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none", with = "decimal::option")]
    pub minor_prize: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_charged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_withdrawed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grand_prize_winners: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grand_prize_tokens: Option<Vec<TokenId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minor_prize_winners: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minor_prize_tokens: Option<Vec<TokenId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<B256>,
}

impl DrawUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge into a full record the way the store does.
    pub fn apply_to(&self, record: &mut DrawRecord) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut record.name, &self.name);
        set(&mut record.owner_wallet, &self.owner_wallet);
        set(&mut record.status, &self.status);
        set(&mut record.treasury, &self.treasury);
        set(&mut record.grand_prize, &self.grand_prize);
        set(&mut record.minor_prize, &self.minor_prize);
        set(&mut record.end_timestamp, &self.end_timestamp);
        set(&mut record.owner_charged, &self.owner_charged);
        set(&mut record.owner_withdrawed, &self.owner_withdrawed);
        set(&mut record.grand_prize_winners, &self.grand_prize_winners);
        set(&mut record.grand_prize_tokens, &self.grand_prize_tokens);
        set(&mut record.minor_prize_winners, &self.minor_prize_winners);
        set(&mut record.minor_prize_tokens, &self.minor_prize_tokens);
        if self.root.is_some() {
            record.root = self.root;
        }
    }
}

/// Participant registration, append-only
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub wallet: Address,
    pub draw_id: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_link: Option<String>,
}

/// Prize or emergency withdrawal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub wallet: Address,
    pub draw_id: Address,
    pub token_id: TokenId,
}

/// Public winner announcement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub wallet: Address,
    pub draw_name: String,
    #[serde(with = "decimal")]
    pub prize: U256,
    pub paytoken: Address,
    pub asset_first: String,
    pub asset_second: String,
    pub asset_third: String,
}

/// Whitelist membership proof for one giveaway winner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub wallet: Address,
    pub giveaway_id: Address,
    pub proof: Vec<B256>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_serializes_only_present_fields() {
        let update = DrawUpdate {
            treasury: Some(U256::from(600u64)),
            owner_charged: Some(true),
            ..Default::default()
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value, json!({"treasury": "600", "owner_charged": true}));
    }

    #[test]
    fn test_status_and_treasury_type_codes() {
        assert_eq!(serde_json::to_value(DrawStatus::Canceled).unwrap(), json!(2));
        assert_eq!(serde_json::to_value(TreasuryType::DynamicSupply).unwrap(), json!(3));
        assert!(serde_json::from_value::<DrawStatus>(json!(7)).is_err());
    }

    #[test]
    fn test_record_tolerates_nulls_and_numeric_amounts() {
        let value = json!({
            "draw_id": "0x0000000000000000000000000000000000000001",
            "name": null,
            "owner_wallet": "0x0000000000000000000000000000000000000002",
            "status": 0,
            "grand_prize_margin": 50,
            "minor_prize_margin": 10,
            "num_grand_wins": 2,
            "num_bonus_wins": 1,
            "entry_fee": 10,
            "paytoken": "0x0000000000000000000000000000000000000000",
            "treasury_type": 3,
            "treasury": "0x258",
            "grand_prize": null,
            "end_timestamp": 1700000000000u64,
            "grand_prize_winners": null
        });
        let record: DrawRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.entry_fee, U256::from(10u64));
        assert_eq!(record.treasury, U256::from(600u64));
        assert_eq!(record.grand_prize, U256::ZERO);
        assert!(record.name.is_empty());
        assert!(record.grand_prize_winners.is_empty());
        assert_eq!(record.root, None);
    }
}
