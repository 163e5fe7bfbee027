#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Reserve Attest
//!
//! A Rust library for Merkle proof-of-reserves attestation:
//! salted liability snapshots anchored on Bitcoin via OP_RETURN.
//!
//! A snapshot commits every custodial (account, token) balance plus a
//! single custodian reserve record into a sorted-pair Merkle tree,
//! anchors the root on-chain with a taproot key-spend transaction, and
//! persists the artifacts needed for later third-party verification.

// Chain anchor writer: transaction construction, signing, broadcast
pub mod anchor;

// External chain client contract and the esplora-style HTTP adapter
pub mod chain;

// Liability and reserve collectors over external source traits
pub mod collect;

// Error types
pub mod errors;

// Sorted-pair Merkle tree, inclusion proofs, proof verification
pub mod merkle;

// Snapshot generation orchestrator
pub mod snapshot;

// On-disk snapshot artifact store
pub mod store;

// Core data model
pub mod types;

// Cryptographic hash functions and hex helpers
pub mod utils;

// Transaction verifier
pub mod verify;

// Re-export commonly used types and functions
pub use anchor::{AnchorKey, AnchorWriter};
pub use chain::{ChainClient, EsploraClient, SpendableOutput, TransactionInfo};
pub use collect::{collect_liabilities, collect_reserve, LiabilitySource, ReserveSource};
pub use errors::{Error, Result};
pub use merkle::MerkleTree;
pub use snapshot::{GeneratorConfig, Snapshot, SnapshotGenerator};
pub use store::SnapshotStore;
pub use types::{AccountBalance, LeafRecord, ReserveBalance, ReserveRecord, ValidationResult};
pub use utils::{sha256, Bytes32};
pub use verify::TransactionVerifier;
