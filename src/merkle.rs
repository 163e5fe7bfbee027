//! Sorted-pair Merkle tree with inclusion proofs
//!
//! The tree commits to a *set* of leaf hashes, not a sequence: the
//! leaf layer is sorted ascending before building, and every pair of
//! node hashes is sorted as raw bytes before concatenation and
//! hashing. The root is therefore invariant under any permutation of
//! the input leaves.
//!
//! Odd-node rule: **promote**. When a level has an odd count, the
//! unpaired trailing node is carried up to the next level unchanged
//! (no duplication). Build and verification both assume this rule;
//! a verifier using the duplicate convention would silently reject
//! valid proofs.

use crate::errors::MerkleError;
use crate::utils::{hash_pair, Bytes32};

/// A built Merkle tree over a set of leaf hashes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    // layers[0] is the sorted leaf layer; the last layer is [root]
    layers: Vec<Vec<Bytes32>>,
}

impl MerkleTree {
    /// Builds a tree from the given leaf hashes.
    ///
    /// The input order is irrelevant: leaves are sorted before
    /// pairing. A tree of exactly one leaf has that leaf as its root,
    /// with no hashing round.
    ///
    /// # Errors
    /// * `MerkleError::EmptyLeafSet` - if `leaf_hashes` is empty
    pub fn build(leaf_hashes: &[Bytes32]) -> Result<Self, MerkleError> {
        if leaf_hashes.is_empty() {
            return Err(MerkleError::EmptyLeafSet);
        }

        let mut leaves = leaf_hashes.to_vec();
        leaves.sort_unstable();

        let mut layers = vec![leaves];
        while layers.last().map(Vec::len).unwrap_or(0) > 1 {
            let current = layers.last().expect("layers is never empty");
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            for pair in current.chunks(2) {
                match pair {
                    [a, b] => next.push(hash_pair(*a, *b)),
                    // Odd trailing node: promoted unchanged
                    [orphan] => next.push(*orphan),
                    _ => unreachable!("chunks(2) yields one- or two-element slices"),
                }
            }
            layers.push(next);
        }

        Ok(Self { layers })
    }

    /// Returns the 32-byte Merkle root
    pub fn root(&self) -> Bytes32 {
        self.layers.last().expect("built tree has at least one layer")[0]
    }

    /// Returns the number of leaves in the tree
    pub fn leaf_count(&self) -> usize { self.layers[0].len() }

    /// Generates an inclusion proof for the given leaf hash.
    ///
    /// The proof is the ordered list of sibling hashes from the leaf
    /// level upward. Levels where the leaf's node was promoted as an
    /// unpaired orphan contribute no sibling. Returns `None` if the
    /// hash is not a leaf of this tree.
    pub fn proof(&self, leaf_hash: &Bytes32) -> Option<Vec<Bytes32>> {
        let mut index = self.layers[0].iter().position(|h| h == leaf_hash)?;

        let mut path = Vec::new();
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = index ^ 1;
            if sibling < layer.len() {
                path.push(layer[sibling]);
            }
            index /= 2;
        }
        Some(path)
    }

    /// Verifies an inclusion proof against a root.
    ///
    /// Replays the sorted-pair hashing up the proof path, so the
    /// sibling order within each pair does not matter — only the
    /// bottom-up sequence of siblings does.
    pub fn verify_proof(proof: &[Bytes32], leaf_hash: Bytes32, root: Bytes32) -> bool {
        let mut current = leaf_hash;
        for sibling in proof {
            current = hash_pair(current, *sibling);
        }
        current == root
    }
}
