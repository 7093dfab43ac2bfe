#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Fixed-depth Merkle tree over voter commitments.
//!
//! Leaves fill left to right; empty slots hold the level-0 zero hash
//! `Z_0 = H("0")`, and `Z_{l+1} = H(Z_l ‖ Z_l)` stands in for entirely empty
//! subtrees. The root is the public eligibility anchor of an election.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::{HValue, h, h_cat};

/// Default tree depth: capacity 2^20 voters.
pub const DEFAULT_DEPTH: usize = 20;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum MerkleError {
    #[error("tree of depth {depth} is full ({capacity} leaves)")]
    TreeFull { depth: usize, capacity: u64 },

    #[error("leaf index {index} is out of range ({len} leaves)")]
    IndexOutOfRange { index: u64, len: u64 },

    #[error("depth {0} is not supported")]
    UnsupportedDepth(usize),
}

/// Registration tree with a fixed depth chosen at construction.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    depth: usize,
    /// `zeros[l]` is the hash of an empty subtree of height `l`.
    zeros: Vec<HValue>,
    leaves: Vec<HValue>,
}

impl MerkleTree {
    pub fn new(depth: usize) -> Result<Self, MerkleError> {
        if depth == 0 || depth > 32 {
            return Err(MerkleError::UnsupportedDepth(depth));
        }

        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(h(b"0"));
        for level in 0..depth {
            let z = zeros[level];
            zeros.push(h_cat(&[z.as_bytes(), z.as_bytes()]));
        }

        Ok(MerkleTree {
            depth,
            zeros,
            leaves: Vec::new(),
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    pub fn len(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Appends a commitment at the next free leaf slot and returns its index.
    pub fn insert(&mut self, leaf: HValue) -> Result<u64, MerkleError> {
        if self.len() >= self.capacity() {
            return Err(MerkleError::TreeFull {
                depth: self.depth,
                capacity: self.capacity(),
            });
        }
        self.leaves.push(leaf);
        Ok(self.len() - 1)
    }

    /// Computes the level vectors of occupied nodes, leaves first. Level `l`
    /// holds `ceil(len / 2^l)` nodes; everything to their right is `zeros[l]`.
    fn occupied_levels(&self) -> Vec<Vec<HValue>> {
        let mut levels = Vec::with_capacity(self.depth + 1);
        levels.push(self.leaves.clone());
        for level in 0..self.depth {
            let current = &levels[level];
            let zero = self.zeros[level];
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                let left = pair[0];
                let right = if pair.len() == 2 { pair[1] } else { zero };
                next.push(h_cat(&[left.as_bytes(), right.as_bytes()]));
            }
            levels.push(next);
        }
        levels
    }

    /// The root over all `2^depth` slots.
    pub fn root(&self) -> HValue {
        if self.leaves.is_empty() {
            return self.zeros[self.depth];
        }
        let levels = self.occupied_levels();
        levels[self.depth][0]
    }

    /// Produces the sibling path for the leaf at `index`.
    pub fn proof(&self, index: u64) -> Result<MerklePath, MerkleError> {
        if index >= self.len() {
            return Err(MerkleError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        let levels = self.occupied_levels();
        let mut siblings = Vec::with_capacity(self.depth);
        let mut position = index as usize;
        for (level, nodes) in levels.iter().enumerate().take(self.depth) {
            let sibling_ix = position ^ 1;
            let sibling = nodes
                .get(sibling_ix)
                .copied()
                .unwrap_or(self.zeros[level]);
            siblings.push(sibling);
            position >>= 1;
        }

        Ok(MerklePath {
            leaf_index: index,
            siblings,
        })
    }
}

/// Inclusion path: one sibling per level, direction taken from the index
/// bits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub leaf_index: u64,
    pub siblings: Vec<HValue>,
}

impl MerklePath {
    /// Folds `leaf` up the path and compares against the anchored root.
    pub fn verify(&self, leaf: &HValue, root: &HValue) -> bool {
        let mut current = *leaf;
        let mut position = self.leaf_index;
        for sibling in &self.siblings {
            current = if position & 1 == 0 {
                h_cat(&[current.as_bytes(), sibling.as_bytes()])
            } else {
                h_cat(&[sibling.as_bytes(), current.as_bytes()])
            };
            position >>= 1;
        }
        current == *root
    }
}
