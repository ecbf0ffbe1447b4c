//! Decoding of factory logs into draw events
//!
//! Both factories emit the same event names. Only `RaffleCreated` differs
//! in layout, so the topic table is keyed by family.

use std::collections::HashMap;

use alloy_primitives::{Address, Bytes, LogData, B256, U256};
use alloy_sol_types::SolEvent;
use once_cell::sync::Lazy;
use raffle_sync_core::{DrawRecord, DrawStatus, Family, TokenId, TreasuryType};

use crate::bindings::{IGiveawayFactory, IRaffleFactory};
use crate::ContractError;

/// Where a log sits in the chain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogMeta {
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

/// A log as delivered by either the backfill or the subscription
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub meta: LogMeta,
}

impl RawLog {
    pub fn topic0(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    OwnerCharged,
    PlayerJoined,
    PrizeRaffled,
    Canceled,
    PrizeWithdrawed,
    OwnerWithdrawed,
    EmergencyWithdrawed,
}

static TOPICS: Lazy<HashMap<(Family, B256), EventKind>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(
        (Family::Raffle, IRaffleFactory::RaffleCreated::SIGNATURE_HASH),
        EventKind::Created,
    );
    table.insert(
        (Family::Giveaway, IGiveawayFactory::RaffleCreated::SIGNATURE_HASH),
        EventKind::Created,
    );
    let shared = [
        (IRaffleFactory::OwnerCharged::SIGNATURE_HASH, EventKind::OwnerCharged),
        (IRaffleFactory::PlayerJoined::SIGNATURE_HASH, EventKind::PlayerJoined),
        (IRaffleFactory::PrizeRaffled::SIGNATURE_HASH, EventKind::PrizeRaffled),
        (IRaffleFactory::RaffleCanceled::SIGNATURE_HASH, EventKind::Canceled),
        (IRaffleFactory::PrizeWithdrawed::SIGNATURE_HASH, EventKind::PrizeWithdrawed),
        (IRaffleFactory::OwnerWithdrawed::SIGNATURE_HASH, EventKind::OwnerWithdrawed),
        (IRaffleFactory::EmergencyWithdrawed::SIGNATURE_HASH, EventKind::EmergencyWithdrawed),
    ];
    for family in [Family::Raffle, Family::Giveaway] {
        for (topic, kind) in shared {
            table.insert((family, topic), kind);
        }
    }
    table
});

/// Classify a log by its first topic
pub fn event_kind(family: Family, topic0: B256) -> Option<EventKind> {
    TOPICS.get(&(family, topic0)).copied()
}

/// Topics a subscription must match for the given family
pub fn topics_for(family: Family) -> Vec<B256> {
    let mut topics: Vec<B256> = TOPICS
        .keys()
        .filter(|(f, _)| *f == family)
        .map(|(_, topic)| *topic)
        .collect();
    topics.sort();
    topics
}

/// Creation parameters, normalized across both families
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawCreated {
    pub draw: Address,
    pub grand_prize_margin: u8,
    pub minor_prize_margin: u8,
    /// Milliseconds; giveaways only
    pub start_time: Option<u64>,
    /// Milliseconds
    pub end_timestamp: u64,
    pub num_grand_wins: u64,
    pub num_bonus_wins: u64,
    pub entry_fee: U256,
    pub paytoken: Address,
    pub treasury_type: TreasuryType,
}

impl DrawCreated {
    /// Initial record for a freshly created draw
    pub fn into_record(self, name: String, owner: Address) -> DrawRecord {
        DrawRecord {
            draw_id: self.draw,
            name,
            owner_wallet: owner,
            status: DrawStatus::Open,
            grand_prize_margin: self.grand_prize_margin,
            minor_prize_margin: self.minor_prize_margin,
            num_grand_wins: self.num_grand_wins,
            num_bonus_wins: self.num_bonus_wins,
            entry_fee: self.entry_fee,
            paytoken: self.paytoken,
            treasury_type: self.treasury_type,
            treasury: U256::ZERO,
            grand_prize: U256::ZERO,
            minor_prize: U256::ZERO,
            start_time: self.start_time,
            end_timestamp: self.end_timestamp,
            owner_charged: false,
            owner_withdrawed: false,
            grand_prize_winners: Vec::new(),
            grand_prize_tokens: Vec::new(),
            minor_prize_winners: Vec::new(),
            minor_prize_tokens: Vec::new(),
            root: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawEvent {
    Created(DrawCreated),
    OwnerCharged {
        draw: Address,
        amount: U256,
        owner: Address,
    },
    PlayerJoined {
        draw: Address,
        player: Address,
    },
    PrizeRaffled {
        draw: Address,
        grand_tokens: Vec<TokenId>,
        minor_tokens: Vec<TokenId>,
    },
    Canceled {
        draw: Address,
    },
    PrizeWithdrawed {
        draw: Address,
        player: Address,
    },
    OwnerWithdrawed {
        draw: Address,
    },
    EmergencyWithdrawed {
        draw: Address,
        player: Address,
    },
}

impl DrawEvent {
    /// Draw instance the event is about
    pub fn draw(&self) -> Address {
        match self {
            DrawEvent::Created(created) => created.draw,
            DrawEvent::OwnerCharged { draw, .. }
            | DrawEvent::PlayerJoined { draw, .. }
            | DrawEvent::PrizeRaffled { draw, .. }
            | DrawEvent::Canceled { draw }
            | DrawEvent::PrizeWithdrawed { draw, .. }
            | DrawEvent::OwnerWithdrawed { draw }
            | DrawEvent::EmergencyWithdrawed { draw, .. } => *draw,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DrawEvent::Created(_) => "RaffleCreated",
            DrawEvent::OwnerCharged { .. } => "OwnerCharged",
            DrawEvent::PlayerJoined { .. } => "PlayerJoined",
            DrawEvent::PrizeRaffled { .. } => "PrizeRaffled",
            DrawEvent::Canceled { .. } => "RaffleCanceled",
            DrawEvent::PrizeWithdrawed { .. } => "PrizeWithdrawed",
            DrawEvent::OwnerWithdrawed { .. } => "OwnerWithdrawed",
            DrawEvent::EmergencyWithdrawed { .. } => "EmergencyWithdrawed",
        }
    }
}

/// Decode a factory log. Unknown topics yield `Ok(None)`.
pub fn decode_log(family: Family, log: &RawLog) -> Result<Option<DrawEvent>, ContractError> {
    let Some(kind) = log.topic0().and_then(|topic| event_kind(family, topic)) else {
        return Ok(None);
    };
    let data = LogData::new_unchecked(log.topics.clone(), log.data.clone());

    let event = match kind {
        EventKind::Created => DrawEvent::Created(match family {
            Family::Raffle => raffle_created(decode::<IRaffleFactory::RaffleCreated>(&data)?)?,
            Family::Giveaway => {
                giveaway_created(decode::<IGiveawayFactory::RaffleCreated>(&data)?)?
            }
        }),
        EventKind::OwnerCharged => {
            let ev = decode::<IRaffleFactory::OwnerCharged>(&data)?;
            DrawEvent::OwnerCharged {
                draw: ev.raffleAddress,
                amount: ev.amount,
                owner: ev.owner,
            }
        }
        EventKind::PlayerJoined => {
            let ev = decode::<IRaffleFactory::PlayerJoined>(&data)?;
            DrawEvent::PlayerJoined {
                draw: ev.raffleAddress,
                player: ev.player,
            }
        }
        EventKind::PrizeRaffled => {
            let ev = decode::<IRaffleFactory::PrizeRaffled>(&data)?;
            DrawEvent::PrizeRaffled {
                draw: ev.raffleAddress,
                grand_tokens: token_ids(&ev.grandPrizeTokens)?,
                minor_tokens: token_ids(&ev.minorPrizeTokens)?,
            }
        }
        EventKind::Canceled => {
            let ev = decode::<IRaffleFactory::RaffleCanceled>(&data)?;
            DrawEvent::Canceled {
                draw: ev.raffleAddress,
            }
        }
        EventKind::PrizeWithdrawed => {
            let ev = decode::<IRaffleFactory::PrizeWithdrawed>(&data)?;
            DrawEvent::PrizeWithdrawed {
                draw: ev.raffleAddress,
                player: ev.player,
            }
        }
        EventKind::OwnerWithdrawed => {
            let ev = decode::<IRaffleFactory::OwnerWithdrawed>(&data)?;
            DrawEvent::OwnerWithdrawed {
                draw: ev.raffleAddress,
            }
        }
        EventKind::EmergencyWithdrawed => {
            let ev = decode::<IRaffleFactory::EmergencyWithdrawed>(&data)?;
            DrawEvent::EmergencyWithdrawed {
                draw: ev.raffleAddress,
                player: ev.player,
            }
        }
    };
    Ok(Some(event))
}

fn decode<E: SolEvent>(data: &LogData) -> Result<E, ContractError> {
    E::decode_log_data(data).map_err(|e| ContractError::Decode {
        event: E::SIGNATURE,
        reason: e.to_string(),
    })
}

fn raffle_created(ev: IRaffleFactory::RaffleCreated) -> Result<DrawCreated, ContractError> {
    Ok(DrawCreated {
        draw: ev.raffleAddress,
        grand_prize_margin: narrow(ev.grandPrizeMargin, "grandPrizeMargin")?,
        minor_prize_margin: narrow(ev.minorPrizeMargin, "minorPrizeMargin")?,
        start_time: None,
        end_timestamp: seconds_to_ms(ev.endTimestamp, "endTimestamp")?,
        num_grand_wins: narrow(ev.numGrandWins, "numGrandWins")?,
        num_bonus_wins: narrow(ev.numBonusWins, "numBonusWins")?,
        entry_fee: ev.entryFee,
        paytoken: ev.paytoken,
        treasury_type: if ev._fixed {
            TreasuryType::Fixed
        } else {
            TreasuryType::DynamicSupply
        },
    })
}

fn giveaway_created(ev: IGiveawayFactory::RaffleCreated) -> Result<DrawCreated, ContractError> {
    Ok(DrawCreated {
        draw: ev.raffleAddress,
        grand_prize_margin: narrow(ev.grandPrizeMargin, "grandPrizeMargin")?,
        minor_prize_margin: narrow(ev.minorPrizeMargin, "minorPrizeMargin")?,
        start_time: Some(seconds_to_ms(ev.startTime, "startTime")?),
        end_timestamp: seconds_to_ms(ev.endTimestamp, "endTimestamp")?,
        num_grand_wins: narrow(ev.numGrandsWins, "numGrandsWins")?,
        num_bonus_wins: narrow(ev.numBonusWins, "numBonusWins")?,
        entry_fee: U256::ZERO,
        paytoken: ev.paytoken,
        treasury_type: TreasuryType::Fixed,
    })
}

fn narrow<T: TryFrom<U256>>(value: U256, field: &'static str) -> Result<T, ContractError> {
    T::try_from(value).map_err(|_| ContractError::OutOfRange { field, value })
}

fn seconds_to_ms(value: U256, field: &'static str) -> Result<u64, ContractError> {
    narrow::<u64>(value, field)?
        .checked_mul(1000)
        .ok_or(ContractError::OutOfRange { field, value })
}

fn token_ids(values: &[U256]) -> Result<Vec<TokenId>, ContractError> {
    values.iter().map(|v| narrow(*v, "tokenId")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const DRAW: Address = address!("00000000000000000000000000000000000000d1");
    const PLAYER: Address = address!("00000000000000000000000000000000000000a1");

    fn raw(data: LogData) -> RawLog {
        RawLog {
            address: Address::ZERO,
            topics: data.topics().to_vec(),
            data: data.data,
            meta: LogMeta::default(),
        }
    }

    #[test]
    fn test_raffle_created_normalizes_units() {
        let ev = IRaffleFactory::RaffleCreated {
            raffleAddress: DRAW,
            grandPrizeMargin: U256::from(60),
            minorPrizeMargin: U256::from(25),
            endTimestamp: U256::from(1_700_000_000u64),
            numGrandWins: U256::from(1),
            numBonusWins: U256::from(3),
            entryFee: U256::from(10),
            paytoken: PLAYER,
            _fixed: false,
        };
        let decoded = decode_log(Family::Raffle, &raw(ev.encode_log_data())).unwrap();
        let Some(DrawEvent::Created(created)) = decoded else {
            panic!("expected creation event, got {decoded:?}");
        };
        assert_eq!(created.end_timestamp, 1_700_000_000_000);
        assert_eq!(created.treasury_type, TreasuryType::DynamicSupply);
        assert_eq!(created.start_time, None);
        assert_eq!(created.grand_prize_margin, 60);
        assert_eq!(created.entry_fee, U256::from(10));
    }

    #[test]
    fn test_giveaway_created_is_fixed() {
        let ev = IGiveawayFactory::RaffleCreated {
            raffleAddress: DRAW,
            startTime: U256::from(10),
            endTimestamp: U256::from(20),
            paytoken: PLAYER,
            grandPrizeMargin: U256::from(50),
            minorPrizeMargin: U256::from(50),
            numGrandsWins: U256::from(1),
            numBonusWins: U256::from(1),
        };
        let decoded = decode_log(Family::Giveaway, &raw(ev.encode_log_data())).unwrap();
        let Some(DrawEvent::Created(created)) = decoded else {
            panic!("expected creation event, got {decoded:?}");
        };
        assert_eq!(created.treasury_type, TreasuryType::Fixed);
        assert_eq!(created.start_time, Some(10_000));
        assert_eq!(created.end_timestamp, 20_000);

        let record = created.into_record("Drop".into(), PLAYER);
        assert_eq!(record.status, DrawStatus::Open);
        assert_eq!(record.owner_wallet, PLAYER);
        assert!(record.root.is_none());
    }

    #[test]
    fn test_creation_layouts_are_family_specific() {
        let ev = IGiveawayFactory::RaffleCreated {
            raffleAddress: DRAW,
            startTime: U256::from(1),
            endTimestamp: U256::from(2),
            paytoken: PLAYER,
            grandPrizeMargin: U256::from(1),
            minorPrizeMargin: U256::from(1),
            numGrandsWins: U256::from(1),
            numBonusWins: U256::from(1),
        };
        assert_eq!(decode_log(Family::Raffle, &raw(ev.encode_log_data())).unwrap(), None);
    }

    #[test]
    fn test_prize_raffled_tokens() {
        let ev = IRaffleFactory::PrizeRaffled {
            raffleAddress: DRAW,
            grandPrizeTokens: vec![U256::from(2)],
            minorPrizeTokens: vec![U256::from(1), U256::from(3)],
        };
        let decoded = decode_log(Family::Giveaway, &raw(ev.encode_log_data())).unwrap();
        assert_eq!(
            decoded,
            Some(DrawEvent::PrizeRaffled {
                draw: DRAW,
                grand_tokens: vec![2],
                minor_tokens: vec![1, 3],
            })
        );
    }

    #[test]
    fn test_out_of_range_margin() {
        let ev = IRaffleFactory::RaffleCreated {
            raffleAddress: DRAW,
            grandPrizeMargin: U256::from(300),
            minorPrizeMargin: U256::ZERO,
            endTimestamp: U256::ZERO,
            numGrandWins: U256::from(1),
            numBonusWins: U256::from(1),
            entryFee: U256::ZERO,
            paytoken: PLAYER,
            _fixed: true,
        };
        let err = decode_log(Family::Raffle, &raw(ev.encode_log_data())).unwrap_err();
        assert!(matches!(err, ContractError::OutOfRange { field: "grandPrizeMargin", .. }));
    }

    #[test]
    fn test_unknown_topic_ignored() {
        let log = RawLog {
            address: Address::ZERO,
            topics: vec![B256::repeat_byte(7)],
            data: Bytes::new(),
            meta: LogMeta::default(),
        };
        assert_eq!(decode_log(Family::Raffle, &log).unwrap(), None);
        let empty = RawLog { topics: vec![], ..log };
        assert_eq!(decode_log(Family::Raffle, &empty).unwrap(), None);
    }

    #[test]
    fn test_event_draw_accessor() {
        let ev = IRaffleFactory::EmergencyWithdrawed {
            raffleAddress: DRAW,
            player: PLAYER,
        };
        let decoded = decode_log(Family::Raffle, &raw(ev.encode_log_data()))
            .unwrap()
            .unwrap();
        assert_eq!(decoded.draw(), DRAW);
        assert_eq!(decoded.name(), "EmergencyWithdrawed");
    }

    #[test]
    fn test_topics_for_family() {
        assert_eq!(topics_for(Family::Raffle).len(), 8);
        assert!(topics_for(Family::Giveaway).contains(&IGiveawayFactory::RaffleCreated::SIGNATURE_HASH));
    }
}
