//! Giveaway whitelist commitment
//!
//! Every registrant is assigned a token id equal to its 1-based position in the
//! registration sequence. The leaf for `(address, token_id)` is
//! `keccak256(address[20] ‖ uint256_be(token_id)[32])`, i.e. Solidity's
//! `keccak256(abi.encodePacked(address, uint256))`.

use alloy_primitives::{Address, B256, U256};
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::merkle::{MerkleError, MerkleTree};
use crate::TokenId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WhitelistError {
    #[error("whitelist has no registrants")]
    Empty,

    #[error("{address} is not whitelisted with token id {token_id}")]
    NotWhitelisted { address: Address, token_id: TokenId },

    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WhitelistEntry {
    pub address: Address,
    pub token_id: TokenId,
}

impl WhitelistEntry {
    pub fn leaf(&self) -> B256 {
        leaf_hash(self.address, self.token_id)
    }
}

/// Frozen registration snapshot together with its Merkle tree
#[derive(Clone, Debug)]
pub struct Whitelist {
    entries: Vec<WhitelistEntry>,
    tree: MerkleTree,
}

impl Whitelist {
    /// Build from wallets in registration order.
    pub fn from_wallets<I>(wallets: I) -> Result<Self, WhitelistError>
    where
        I: IntoIterator<Item = Address>,
    {
        let entries: Vec<WhitelistEntry> = wallets
            .into_iter()
            .zip(1u64..)
            .map(|(address, token_id)| WhitelistEntry { address, token_id })
            .collect();

        if entries.is_empty() {
            return Err(WhitelistError::Empty);
        }

        let leaves = entries.iter().map(WhitelistEntry::leaf).collect();
        let tree = MerkleTree::new(leaves)?;

        Ok(Self { entries, tree })
    }

    pub fn root(&self) -> B256 {
        self.tree.root()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[WhitelistEntry] {
        &self.entries
    }

    /// Registrant holding `token_id`.
    pub fn entry(&self, token_id: TokenId) -> Option<&WhitelistEntry> {
        let index = usize::try_from(token_id.checked_sub(1)?).ok()?;
        self.entries.get(index)
    }

    /// Sibling path proving `(address, token_id)` belongs to the committed set.
    pub fn proof_for(&self, address: Address, token_id: TokenId) -> Result<Vec<B256>, WhitelistError> {
        let leaf = leaf_hash(address, token_id);
        let index = token_id
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok());

        match index {
            Some(i) if self.tree.leaves().get(i) == Some(&leaf) => Ok(self.tree.proof(i)?.path),
            _ => Err(WhitelistError::NotWhitelisted { address, token_id }),
        }
    }
}

/// `keccak256(abi.encodePacked(address, uint256(token_id)))`
pub fn leaf_hash(address: Address, token_id: TokenId) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(address.as_slice());
    hasher.update(U256::from(token_id).to_be_bytes::<32>());
    B256::from_slice(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::verify;

    fn wallet(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    #[test]
    fn test_leaf_encoding_is_packed() {
        let address = wallet(0xab);
        let mut packed = Vec::with_capacity(52);
        packed.extend_from_slice(address.as_slice());
        packed.extend_from_slice(&[0u8; 31]);
        packed.push(7);
        let expected = B256::from_slice(&Keccak256::digest(&packed));
        assert_eq!(leaf_hash(address, 7), expected);
    }

    #[test]
    fn test_token_ids_are_one_based() {
        let list = Whitelist::from_wallets([wallet(1), wallet(2), wallet(3)]).unwrap();
        assert_eq!(list.entry(1).unwrap().address, wallet(1));
        assert_eq!(list.entry(3).unwrap().address, wallet(3));
        assert!(list.entry(0).is_none());
        assert!(list.entry(4).is_none());
    }

    #[test]
    fn test_every_registrant_has_a_valid_proof() {
        let wallets: Vec<_> = (1..=9).map(wallet).collect();
        let list = Whitelist::from_wallets(wallets.clone()).unwrap();
        for (i, w) in wallets.iter().enumerate() {
            let token_id = i as u64 + 1;
            let proof = list.proof_for(*w, token_id).unwrap();
            assert!(verify(list.root(), leaf_hash(*w, token_id), &proof));
        }
    }

    #[test]
    fn test_outsider_gets_no_proof() {
        let list = Whitelist::from_wallets([wallet(1), wallet(2), wallet(3)]).unwrap();
        let outsider = wallet(9);
        for token_id in 0..=4 {
            assert!(list.proof_for(outsider, token_id).is_err());
        }
        // a member's path does not verify an outsider's leaf
        let path = list.proof_for(wallet(2), 2).unwrap();
        assert!(!verify(list.root(), leaf_hash(outsider, 2), &path));
    }

    #[test]
    fn test_wrong_token_id_rejected() {
        let list = Whitelist::from_wallets([wallet(1), wallet(2)]).unwrap();
        assert_eq!(
            list.proof_for(wallet(1), 2).unwrap_err(),
            WhitelistError::NotWhitelisted { address: wallet(1), token_id: 2 }
        );
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let wallets = [wallet(5), wallet(4), wallet(4), wallet(7)];
        let first = Whitelist::from_wallets(wallets).unwrap();
        let second = Whitelist::from_wallets(wallets).unwrap();
        assert_eq!(first.root(), second.root());
    }

    #[test]
    fn test_registration_order_matters() {
        let forward = Whitelist::from_wallets([wallet(1), wallet(2), wallet(3)]).unwrap();
        let reversed = Whitelist::from_wallets([wallet(3), wallet(2), wallet(1)]).unwrap();
        assert_ne!(forward.root(), reversed.root());
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert_eq!(
            Whitelist::from_wallets(std::iter::empty()).unwrap_err(),
            WhitelistError::Empty
        );
    }
}
