//! Core data model for snapshots and verification results

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::utils::{sha256, Bytes32};

/// Number of random bytes in a leaf nonce (stored as 32 hex chars)
pub const NONCE_BYTES: usize = 16;

/// One (account, token) balance row as reported by the liability source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountBalance {
    /// Custodial account identifier
    pub account_id: String,
    /// Token code, e.g. "USD" or "EUR"
    pub token_code: String,
    /// Balance as a decimal string, arbitrary precision
    pub balance: String,
}

/// A salted liability leaf.
///
/// The canonical raw string is `account_id:nonce:token_code:balance`,
/// colon-delimited; fields never contain colons by construction. The
/// nonce is freshly generated per snapshot per leaf and never reused,
/// so leaf hashes are unlinkable across snapshots. Values are stored
/// in the clear next to their hashes: privacy relies solely on nonce
/// unguessability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafRecord {
    /// Custodial account identifier
    pub account_id: String,
    /// Token code, e.g. "USD" or "EUR"
    pub token_code: String,
    /// Balance as a decimal string, arbitrary precision
    pub balance: String,
    /// 16 random bytes, lowercase hex
    pub nonce: String,
}

impl LeafRecord {
    /// Creates a leaf from a balance row with a fresh random nonce
    pub fn new(row: AccountBalance) -> Self {
        let mut nonce_bytes = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        Self {
            account_id: row.account_id,
            token_code: row.token_code,
            balance: row.balance,
            nonce: hex::encode(nonce_bytes),
        }
    }

    /// Creates a leaf with an explicit nonce (reproducible, for tests
    /// and for callers that persist nonces out-of-band for user
    /// self-verification)
    pub fn with_nonce(row: AccountBalance, nonce: String) -> Self {
        Self {
            account_id: row.account_id,
            token_code: row.token_code,
            balance: row.balance,
            nonce,
        }
    }

    /// Returns the canonical raw string committed by the leaf hash
    pub fn raw(&self) -> String {
        format!("{}:{}:{}:{}", self.account_id, self.nonce, self.token_code, self.balance)
    }

    /// Returns the leaf hash: SHA-256 of the canonical raw string
    pub fn leaf_hash(&self) -> Bytes32 { sha256(self.raw()) }
}

/// Typed mirror of the custodian balance payload.
///
/// Field order is the canonical serialization order: the reserve leaf
/// hash commits to the exact `serde_json` bytes of this struct, so a
/// third party must reproduce the same ordering to re-derive the hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveBalance {
    /// Funds available for payout
    pub available: Vec<ReserveFunds>,
    /// Funds not yet settled
    pub pending: Vec<ReserveFunds>,
    /// Whether the balance was reported from a live-mode account
    pub livemode: bool,
}

/// One currency bucket of the custodian balance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveFunds {
    /// Amount in the currency's minor unit (e.g. cents)
    pub amount: i64,
    /// Lowercase ISO currency code
    pub currency: String,
}

/// The single reserve leaf of a snapshot.
///
/// `raw` is the canonical serialization fetched at generation time;
/// `hash` is SHA-256 over those exact bytes. Exactly one reserve leaf
/// exists per snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReserveRecord {
    /// Canonical JSON serialization of the reserve balance
    pub raw: String,
    /// SHA-256 of `raw`
    pub hash: Bytes32,
}

impl ReserveRecord {
    /// Builds a reserve record from its canonical serialization
    pub fn from_raw(raw: String) -> Self {
        let hash = sha256(&raw);
        Self { raw, hash }
    }
}

/// Root/txid binding persisted per snapshot (`root.txt`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootBinding {
    /// Merkle root, lowercase hex
    pub merkle_root: String,
    /// Transaction id of the anchoring transaction
    pub bitcoin_txid: String,
}

/// Equality triple comparing the three roots seen during verification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootComparison {
    /// Rebuilt root equals the root stored in the snapshot binding
    pub rebuilt_vs_stored: bool,
    /// Rebuilt root equals the root embedded in the OP_RETURN output
    pub rebuilt_vs_chain: bool,
    /// Stored root equals the root embedded in the OP_RETURN output
    pub stored_vs_chain: bool,
}

/// Outcome of verifying an anchoring transaction against stored
/// snapshot artifacts.
///
/// Computed per verification call, never persisted. "Snapshot not
/// found" and "transaction unconfirmed" are normal outcomes reported
/// here, not errors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Whether the transaction is confirmed on-chain
    pub confirmed: bool,
    /// Block height of the confirming block, if confirmed
    pub block_height: Option<u32>,
    /// Merkle root extracted from the transaction's OP_RETURN output,
    /// lowercase hex
    pub merkle_root: Option<String>,
    /// Whether a stored snapshot matched the transaction id
    pub snapshot_found: bool,
    /// Id of the matching snapshot, if any
    pub snapshot_id: Option<String>,
    /// Whether the snapshot yielded at least one rebuildable liability
    /// leaf and a rebuildable reserve leaf
    pub snapshot_validation_complete: bool,
    /// `confirmed && snapshot_validation_complete`.
    ///
    /// Individual leaf-proof failures are surfaced via
    /// [`proofs_valid`](Self::proofs_valid) and logged, but do not
    /// independently flip this flag.
    pub is_valid: bool,
    /// Root equality diagnostics, when the tree could be rebuilt
    pub root_comparison: Option<RootComparison>,
    /// Whether every liability leaf and the reserve leaf passed its
    /// inclusion proof against the rebuilt root; `None` when the tree
    /// could not be rebuilt
    pub proofs_valid: Option<bool>,
}

impl ValidationResult {
    /// Result for a transaction with no matching stored snapshot
    pub(crate) fn without_snapshot(
        confirmed: bool,
        block_height: Option<u32>,
        merkle_root: Option<String>,
    ) -> Self {
        Self {
            confirmed,
            block_height,
            merkle_root,
            snapshot_found: false,
            snapshot_id: None,
            snapshot_validation_complete: false,
            is_valid: false,
            root_comparison: None,
            proofs_valid: None,
        }
    }
}
