//! Core logic for raffle/giveaway reconciliation
//!
//! Everything in this crate is free of I/O:
//! - [`prizes`] - treasury and per-winner prize arithmetic
//! - [`lifecycle`] - OPEN -> RAFFLED | CANCELED state machine over [`DrawRecord`]
//! - [`merkle`] - sorted-pair keccak Merkle tree
//! - [`whitelist`] - giveaway registrant commitment and proofs
//! - [`records`] - record store entities

pub mod decimal;
pub mod lifecycle;
pub mod merkle;
pub mod prizes;
pub mod records;
pub mod whitelist;

pub use lifecycle::{LifecycleError, ResolvedWinners};
pub use merkle::{MerkleError, MerkleProof, MerkleTree};
pub use prizes::{compute_prizes, PrizeBreakdown, PrizeError, PrizeTerms};
pub use records::{
    DrawRecord, DrawStatus, DrawUpdate, Family, ProofRecord, Registration, TreasuryType,
    Withdrawal, WinnerRecord, EMERGENCY_TOKEN_ID,
};
pub use whitelist::{leaf_hash, Whitelist, WhitelistEntry, WhitelistError};

/// Prize unit identifier: the raffle NFT id, or a giveaway registrant's
/// 1-based registration position
pub type TokenId = u64;
