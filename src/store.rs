//! On-disk snapshot artifact store
//!
//! One directory per snapshot id, three artifacts each:
//!
//! * `liabilities.csv` — header `leaf_hash,raw`, then one
//!   `{hex hash},{raw}` row per liability leaf
//! * `stripe_balance.json` — the reserve record's exact raw bytes
//! * `root.txt` — JSON `{ "merkle_root": hex, "bitcoin_txid": id }`
//!
//! The store is append-only: the core never edits or deletes a
//! snapshot; retention is an external concern. Lookups scan the
//! directory linearly — O(snapshot count), fine at one snapshot per
//! day. The filesystem layout stays behind this type so an indexed
//! backend could replace it without touching the verifier.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::errors::StoreError;
use crate::types::{LeafRecord, ReserveRecord, RootBinding};
use crate::utils::{from_hex, to_hex, Bytes32};

const LIABILITIES_FILE: &str = "liabilities.csv";
const RESERVE_FILE: &str = "stripe_balance.json";
const BINDING_FILE: &str = "root.txt";
const LEAF_HEADER: &str = "leaf_hash,raw";

/// A liability leaf as read back from the store.
///
/// Only the committed pair survives persistence; the structured
/// fields of [`LeafRecord`] are recoverable from `raw` but
/// verification needs nothing beyond hash and raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredLeaf {
    /// The persisted leaf hash
    pub hash: Bytes32,
    /// The canonical raw string the hash commits to
    pub raw: String,
}

/// Snapshot artifact store rooted at a directory
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    root_dir: PathBuf,
}

impl SnapshotStore {
    /// Creates a store rooted at the given directory.
    ///
    /// The directory is created on first write, not here.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self { Self { root_dir: root_dir.into() } }

    /// Returns the store's root directory
    pub fn root_dir(&self) -> &Path { &self.root_dir }

    fn snapshot_dir(&self, snapshot_id: &str) -> PathBuf { self.root_dir.join(snapshot_id) }

    /// Writes the three artifacts of a snapshot.
    ///
    /// Called only after anchoring succeeded, so a failed anchor
    /// never leaves a directory with a false txid behind. Writing the
    /// same snapshot id twice overwrites — same-day concurrent
    /// generation runs are not guarded against.
    pub fn write(
        &self,
        snapshot_id: &str,
        leaves: &[LeafRecord],
        reserve: &ReserveRecord,
        root: Bytes32,
        txid: &str,
    ) -> Result<(), StoreError> {
        let dir = self.snapshot_dir(snapshot_id);
        fs::create_dir_all(&dir)?;

        let mut csv = String::from(LEAF_HEADER);
        for leaf in leaves {
            csv.push('\n');
            csv.push_str(&to_hex(leaf.leaf_hash()));
            csv.push(',');
            csv.push_str(&leaf.raw());
        }
        fs::write(dir.join(LIABILITIES_FILE), csv)?;

        fs::write(dir.join(RESERVE_FILE), &reserve.raw)?;

        let binding =
            RootBinding { merkle_root: to_hex(root), bitcoin_txid: txid.to_string() };
        let binding_json = serde_json::to_string_pretty(&binding).map_err(|e| {
            StoreError::MalformedBinding {
                snapshot_id: snapshot_id.to_string(),
                reason: e.to_string(),
            }
        })?;
        fs::write(dir.join(BINDING_FILE), binding_json)?;

        Ok(())
    }

    /// Lists every stored snapshot id with its parsed root binding.
    ///
    /// Entries whose binding is missing or unparseable are skipped
    /// with a warning rather than failing the whole scan.
    pub fn read_all(&self) -> Result<Vec<(String, RootBinding)>, StoreError> {
        let mut snapshots = Vec::new();
        let entries = match fs::read_dir(&self.root_dir) {
            Ok(entries) => entries,
            // An absent store simply holds no snapshots yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(snapshots),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let snapshot_id = entry.file_name().to_string_lossy().to_string();
            match self.read_binding(&snapshot_id) {
                Ok(binding) => snapshots.push((snapshot_id, binding)),
                Err(e) => {
                    warn!(snapshot_id, error = %e, "skipping unreadable snapshot");
                }
            }
        }

        snapshots.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(snapshots)
    }

    /// Reads the root binding of one snapshot
    pub fn read_binding(&self, snapshot_id: &str) -> Result<RootBinding, StoreError> {
        let path = self.snapshot_dir(snapshot_id).join(BINDING_FILE);
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| StoreError::MalformedBinding {
            snapshot_id: snapshot_id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Finds the snapshot whose binding names the given txid.
    ///
    /// Linear scan over all stored snapshots; `None` is a normal
    /// outcome, not an error.
    pub fn find_by_txid(&self, txid: &str) -> Result<Option<(String, RootBinding)>, StoreError> {
        Ok(self.read_all()?.into_iter().find(|(_, binding)| binding.bitcoin_txid == txid))
    }

    /// Reads the liability leaves of a snapshot
    pub fn read_leaves(&self, snapshot_id: &str) -> Result<Vec<StoredLeaf>, StoreError> {
        let path = self.snapshot_dir(snapshot_id).join(LIABILITIES_FILE);
        if !path.exists() {
            return Err(StoreError::SnapshotMissing(snapshot_id.to_string()));
        }
        let contents = fs::read_to_string(path)?;

        let mut leaves = Vec::new();
        // Skip the header row
        for row in contents.lines().skip(1) {
            if row.is_empty() {
                continue;
            }
            let (hash_hex, raw) =
                row.split_once(',').ok_or_else(|| StoreError::MalformedLeafRow {
                    snapshot_id: snapshot_id.to_string(),
                    row: row.to_string(),
                })?;
            leaves.push(StoredLeaf { hash: from_hex(hash_hex)?, raw: raw.to_string() });
        }
        Ok(leaves)
    }

    /// Reads the reserve record of a snapshot.
    ///
    /// The hash is recomputed over the exact file bytes — the same
    /// bytes that were hashed at generation time.
    pub fn read_reserve(&self, snapshot_id: &str) -> Result<ReserveRecord, StoreError> {
        let path = self.snapshot_dir(snapshot_id).join(RESERVE_FILE);
        if !path.exists() {
            return Err(StoreError::SnapshotMissing(snapshot_id.to_string()));
        }
        let raw = fs::read_to_string(path)?;
        Ok(ReserveRecord::from_raw(raw))
    }
}
