//! Contract bindings for the raffle and giveaway factories

mod addresses;
pub mod bindings;
pub mod events;

pub use addresses::FactoryAddresses;
pub use bindings::{IDrawInstance, IGiveawayFactory, IRaffleFactory};
pub use events::{decode_log, topics_for, DrawCreated, DrawEvent, EventKind, LogMeta, RawLog};

use alloy_primitives::U256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("failed to decode {event}: {reason}")]
    Decode { event: &'static str, reason: String },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: U256 },
}
