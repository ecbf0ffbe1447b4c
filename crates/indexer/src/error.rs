//! Error types and their failure classes

use alloy_primitives::{Address, B256};
use raffle_sync_contracts::ContractError;
use raffle_sync_core::{LifecycleError, TokenId, WhitelistError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Record store read failed: {0}")]
    StoreRead(String),

    #[error("Record store write failed: {0}")]
    StoreWrite(String),

    #[error("Chain read failed: {0}")]
    ChainRead(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] sqlx::Error),

    #[error("Log decode failed: {0}")]
    Decode(#[from] ContractError),

    #[error("Draw {0} not found")]
    DrawNotFound(Address),

    #[error("Draw {0} already exists")]
    DrawExists(Address),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Whitelist(#[from] WhitelistError),

    #[error("Giveaway {0} has no registrations")]
    EmptyRegistry(Address),

    #[error("Giveaway {giveaway} published root {published}, rebuilt {rebuilt}")]
    RootMismatch {
        giveaway: Address,
        published: B256,
        rebuilt: B256,
    },

    #[error("Registration for giveaway {giveaway} is frozen at root {root}")]
    RegistrationFrozen { giveaway: Address, root: B256 },

    #[error("Giveaway {0} reached proof generation before its winners were resolved")]
    WinnersUnresolved(Address),

    #[error("Token {token} of giveaway {giveaway} has no registrant")]
    UnknownRegistrant { giveaway: Address, token: TokenId },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// How a failed workflow is reported
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    UpstreamRead,
    UpstreamWrite,
    /// Data is inconsistent; fatal to the workflow
    Invariant,
    /// A precondition failed, e.g. a transition out of a terminal status
    Rejected,
    Internal,
}

impl IndexerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::StoreRead(_) | Self::ChainRead(_) | Self::Subscription(_) => {
                ErrorClass::UpstreamRead
            }
            Self::StoreWrite(_) => ErrorClass::UpstreamWrite,
            Self::DrawNotFound(_) | Self::DrawExists(_) | Self::RegistrationFrozen { .. } => {
                ErrorClass::Rejected
            }
            Self::Lifecycle(err) => match err {
                LifecycleError::NotOpen { .. }
                | LifecycleError::Canceled { .. }
                | LifecycleError::RootAlreadyPublished { .. } => ErrorClass::Rejected,
                LifecycleError::WinnerNotFound { .. }
                | LifecycleError::WinnerTokenMismatch { .. }
                | LifecycleError::Prize(_) => ErrorClass::Invariant,
            },
            Self::Decode(_)
            | Self::Whitelist(_)
            | Self::EmptyRegistry(_)
            | Self::RootMismatch { .. }
            | Self::WinnersUnresolved(_)
            | Self::UnknownRegistrant { .. } => ErrorClass::Invariant,
            Self::Ledger(_) | Self::Config(_) | Self::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Log a failed workflow at the level of its class.
    pub fn log_failure(&self, workflow: &str, draw: Address) {
        match self.class() {
            ErrorClass::Invariant => {
                tracing::error!(%draw, workflow, "Invariant violated: {}", self)
            }
            ErrorClass::Internal => tracing::error!(%draw, workflow, "Internal failure: {}", self),
            ErrorClass::Rejected => tracing::warn!(%draw, workflow, "Event rejected: {}", self),
            ErrorClass::UpstreamRead => {
                tracing::warn!(%draw, workflow, "Upstream read failed: {}", self)
            }
            ErrorClass::UpstreamWrite => {
                tracing::warn!(%draw, workflow, "Upstream write failed: {}", self)
            }
        }
    }
}

pub type IndexerResult<T> = Result<T, IndexerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use raffle_sync_core::{DrawStatus, PrizeError};

    #[test]
    fn test_error_classes() {
        let draw = Address::repeat_byte(1);
        assert_eq!(
            IndexerError::StoreRead("timeout".into()).class(),
            ErrorClass::UpstreamRead
        );
        assert_eq!(
            IndexerError::StoreWrite("500".into()).class(),
            ErrorClass::UpstreamWrite
        );
        assert_eq!(
            IndexerError::from(LifecycleError::NotOpen {
                draw,
                status: DrawStatus::Raffled
            })
            .class(),
            ErrorClass::Rejected
        );
        assert_eq!(
            IndexerError::from(LifecycleError::WinnerNotFound { draw, player: draw }).class(),
            ErrorClass::Invariant
        );
        assert_eq!(
            IndexerError::from(LifecycleError::Prize(PrizeError::ZeroGrandWins)).class(),
            ErrorClass::Invariant
        );
        assert_eq!(IndexerError::EmptyRegistry(draw).class(), ErrorClass::Invariant);
    }
}
