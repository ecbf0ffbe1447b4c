//! Sorted-pair keccak Merkle tree
//!
//! Matches the tree the on-chain verifier expects (OpenZeppelin `MerkleProof`):
//! - parent = keccak256(min(a, b) ‖ max(a, b))
//! - an unpaired node at the end of a layer is promoted unchanged
//! - a proof is the list of siblings from leaf to root, skipping levels where
//!   the node had no sibling

use alloy_primitives::B256;
use rayon::prelude::*;
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Layers above this size are hashed in parallel
const PARALLEL_LAYER_THRESHOLD: usize = 1 << 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a tree without leaves")]
    Empty,

    #[error("leaf index {index} out of range (tree has {len} leaves)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Merkle tree keeping every layer so proofs can be served without rebuilding
#[derive(Clone, Debug)]
pub struct MerkleTree {
    /// `layers[0]` are the leaves, the last layer holds only the root
    layers: Vec<Vec<B256>>,
}

/// Membership proof for one leaf
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf: B256,
    pub path: Vec<B256>,
}

impl MerkleTree {
    /// Build a tree over `leaves` in the given order.
    pub fn new(leaves: Vec<B256>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::Empty);
        }

        let mut layers = vec![leaves];
        while layers.last().map_or(false, |layer| layer.len() > 1) {
            let next = match layers.last() {
                Some(layer) => next_layer(layer),
                None => break,
            };
            layers.push(next);
        }

        Ok(Self { layers })
    }

    pub fn root(&self) -> B256 {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn leaves(&self) -> &[B256] {
        &self.layers[0]
    }

    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    /// Proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        let len = self.len();
        if index >= len {
            return Err(MerkleError::IndexOutOfRange { index, len });
        }

        let mut path = Vec::with_capacity(self.layers.len());
        let mut current = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = current ^ 1;
            if let Some(node) = layer.get(sibling) {
                path.push(*node);
            }
            current /= 2;
        }

        Ok(MerkleProof {
            leaf: self.layers[0][index],
            path,
        })
    }

    /// Position of the first occurrence of `leaf`.
    pub fn position(&self, leaf: &B256) -> Option<usize> {
        self.layers[0].iter().position(|l| l == leaf)
    }
}

impl MerkleProof {
    pub fn compute_root(&self) -> B256 {
        self.path
            .iter()
            .fold(self.leaf, |acc, sibling| hash_pair(&acc, sibling))
    }

    pub fn verify(&self, expected_root: B256) -> bool {
        self.compute_root() == expected_root
    }
}

/// Verify a bare sibling path the way the on-chain verifier does.
pub fn verify(root: B256, leaf: B256, path: &[B256]) -> bool {
    path.iter().fold(leaf, |acc, sibling| hash_pair(&acc, sibling)) == root
}

/// keccak256 over the lexicographically ordered pair
pub fn hash_pair(a: &B256, b: &B256) -> B256 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Keccak256::new();
    hasher.update(lo.as_slice());
    hasher.update(hi.as_slice());
    B256::from_slice(&hasher.finalize())
}

fn next_layer(layer: &[B256]) -> Vec<B256> {
    let combine = |pair: &[B256]| match pair {
        [left, right] => hash_pair(left, right),
        [single] => *single,
        _ => B256::ZERO,
    };

    if layer.len() >= PARALLEL_LAYER_THRESHOLD {
        layer.par_chunks(2).map(combine).collect()
    } else {
        layer.chunks(2).map(combine).collect()
    }
}
