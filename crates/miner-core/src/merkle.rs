//! Merkle tree computation for block transactions.

use crate::hash::{hash_pair, Hash256};
use crate::transaction::BlockTransaction;

/// Compute the merkle root from a list of transaction IDs.
///
/// For a single transaction (like a coinbase-only block), the merkle root
/// is simply the txid itself. Otherwise levels are reduced pairwise,
/// duplicating the last entry of an odd level, until one digest remains.
/// An empty list yields the zero hash.
pub fn compute_merkle_root(txids: &[Hash256]) -> Hash256 {
    if txids.is_empty() {
        return [0u8; 32];
    }

    let mut current_level: Vec<Hash256> = txids.to_vec();

    while current_level.len() > 1 {
        current_level = next_level(&current_level);
    }

    current_level[0]
}

/// Merkle root of block transactions, in the order given.
pub fn merkle_root(transactions: &[BlockTransaction]) -> Hash256 {
    let txids: Vec<Hash256> = transactions.iter().map(BlockTransaction::txid).collect();
    compute_merkle_root(&txids)
}

fn next_level(level: &[Hash256]) -> Vec<Hash256> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            [single] => hash_pair(single, single),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// A merkle tree keeping every level, for inclusion proofs.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Leaves first, root level last.
    levels: Vec<Vec<Hash256>>,
}

/// Inclusion proof for one leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf: Hash256,
    /// Sibling digests from the leaf level upwards.
    pub siblings: Vec<Hash256>,
    /// For each sibling, whether the running digest is the left operand.
    pub is_left: Vec<bool>,
}

impl MerkleTree {
    pub fn new(leaves: &[Hash256]) -> Self {
        if leaves.is_empty() {
            return MerkleTree {
                levels: vec![vec![[0u8; 32]]],
            };
        }

        let mut levels = vec![leaves.to_vec()];
        while let Some(level) = levels.last().filter(|level| level.len() > 1) {
            let next = next_level(level);
            levels.push(next);
        }

        MerkleTree { levels }
    }

    pub fn root(&self) -> Hash256 {
        self.levels[self.levels.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Proof for the leaf at `index`, `None` if out of range.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let leaf = *self.levels[0].get(index)?;
        let mut siblings = Vec::with_capacity(self.levels.len());
        let mut is_left = Vec::with_capacity(self.levels.len());
        let mut idx = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            // The last node of an odd level pairs with itself
            let sibling = level.get(sibling_idx).copied().unwrap_or(level[idx]);
            siblings.push(sibling);
            is_left.push(idx % 2 == 0);
            idx /= 2;
        }

        Some(MerkleProof { leaf, siblings, is_left })
    }
}

/// Check that `proof` leads from its leaf to `root`.
pub fn verify_proof(root: &Hash256, proof: &MerkleProof) -> bool {
    if proof.siblings.len() != proof.is_left.len() {
        return false;
    }

    let computed = proof
        .siblings
        .iter()
        .zip(&proof.is_left)
        .fold(proof.leaf, |current, (sibling, is_left)| {
            if *is_left {
                hash_pair(&current, sibling)
            } else {
                hash_pair(sibling, &current)
            }
        });

    computed == *root
}
