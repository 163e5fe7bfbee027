//! Transaction verifier
//!
//! Re-derives a snapshot's Merkle tree from stored artifacts and
//! checks it against the root a transaction anchored on-chain.
//!
//! "Snapshot not found" and "transaction unconfirmed" are normal
//! outcomes of normal operation: they fold into the returned
//! [`ValidationResult`] instead of being raised as errors. Only
//! transport-level chain failures propagate as hard errors.

use std::sync::Arc;

use bitcoin::{Transaction, Txid};
use tracing::{info, warn};

use crate::anchor::extract_anchored_root;
use crate::chain::ChainClient;
use crate::errors::{ChainError, Result};
use crate::merkle::MerkleTree;
use crate::store::{SnapshotStore, StoredLeaf};
use crate::types::{ReserveRecord, RootComparison, ValidationResult};
use crate::utils::{sha256, to_hex, Bytes32};

/// Verifies anchoring transactions against stored snapshots
pub struct TransactionVerifier {
    chain: Arc<dyn ChainClient>,
    store: SnapshotStore,
}

impl TransactionVerifier {
    /// Creates a verifier over a chain client and the artifact store
    pub fn new(chain: Arc<dyn ChainClient>, store: SnapshotStore) -> Self {
        Self { chain, store }
    }

    /// Verifies the transaction with the given id.
    ///
    /// Steps:
    /// 1. Fetch confirmation status and the raw transaction; extract
    ///    the OP_RETURN root.
    /// 2. Scan stored snapshots for a binding naming this txid.
    /// 3. If found, read the snapshot's leaves and reserve record and
    ///    rebuild the tree from the stored hashes.
    /// 4. Check every leaf's inclusion proof against the rebuilt
    ///    root, recomputing each leaf hash from its stored raw bytes
    ///    so tampered raw data fails its own proof.
    /// 5. `is_valid = confirmed && snapshot_validation_complete`.
    pub async fn verify(&self, txid: Txid) -> Result<ValidationResult> {
        info!(%txid, "verifying transaction");

        let tx_info = self.chain.transaction(txid).await?;
        let raw = self.chain.raw_transaction(txid).await?;
        let tx: Transaction = bitcoin::consensus::encode::deserialize(&raw)
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
        let chain_root = extract_anchored_root(&tx);

        let Some((snapshot_id, binding)) = self.store.find_by_txid(&txid.to_string())? else {
            info!(%txid, "no matching snapshot found");
            return Ok(ValidationResult::without_snapshot(
                tx_info.confirmed,
                tx_info.block_height,
                chain_root.map(to_hex),
            ));
        };
        info!(snapshot_id, "found matching snapshot");

        let leaves = self.read_leaves_soft(&snapshot_id)?;
        let reserve = self.read_reserve_soft(&snapshot_id)?;
        let snapshot_validation_complete = !leaves.is_empty() && reserve.is_some();

        let mut root_comparison = None;
        let mut proofs_valid = None;
        if let Some(reserve) = &reserve {
            if !leaves.is_empty() {
                let mut hashes: Vec<Bytes32> = leaves.iter().map(|l| l.hash).collect();
                hashes.push(reserve.hash);
                let tree = MerkleTree::build(&hashes)?;
                let rebuilt_root = tree.root();

                let comparison = RootComparison {
                    rebuilt_vs_stored: to_hex(rebuilt_root) == binding.merkle_root,
                    rebuilt_vs_chain: chain_root == Some(rebuilt_root),
                    stored_vs_chain: chain_root.map(to_hex).as_ref()
                        == Some(&binding.merkle_root),
                };
                if !(comparison.rebuilt_vs_stored
                    && comparison.rebuilt_vs_chain
                    && comparison.stored_vs_chain)
                {
                    warn!(
                        snapshot_id,
                        rebuilt = %to_hex(rebuilt_root),
                        stored = binding.merkle_root,
                        "root mismatch"
                    );
                }
                root_comparison = Some(comparison);
                proofs_valid = Some(self.check_proofs(&tree, &leaves, reserve, &snapshot_id));
            }
        }

        let is_valid = tx_info.confirmed && snapshot_validation_complete;
        info!(%txid, is_valid, "verification finished");

        Ok(ValidationResult {
            confirmed: tx_info.confirmed,
            block_height: tx_info.block_height,
            merkle_root: chain_root.map(to_hex),
            snapshot_found: true,
            snapshot_id: Some(snapshot_id),
            snapshot_validation_complete,
            is_valid,
            root_comparison,
            proofs_valid,
        })
    }

    // Checks every liability leaf and the reserve leaf against the
    // rebuilt root. Each leaf hash is recomputed from the stored raw
    // bytes: a tampered raw fails its own proof while the other
    // leaves still verify.
    fn check_proofs(
        &self,
        tree: &MerkleTree,
        leaves: &[StoredLeaf],
        reserve: &ReserveRecord,
        snapshot_id: &str,
    ) -> bool {
        let root = tree.root();
        let mut all_valid = true;

        for (i, leaf) in leaves.iter().enumerate() {
            let recomputed = sha256(&leaf.raw);
            let verified = tree
                .proof(&recomputed)
                .map(|proof| MerkleTree::verify_proof(&proof, recomputed, root))
                .unwrap_or(false);
            if !verified {
                warn!(snapshot_id, leaf = i, raw = leaf.raw, "liability leaf failed its proof");
                all_valid = false;
            }
        }

        let reserve_verified = tree
            .proof(&reserve.hash)
            .map(|proof| MerkleTree::verify_proof(&proof, reserve.hash, root))
            .unwrap_or(false);
        if !reserve_verified {
            warn!(snapshot_id, "reserve leaf failed its proof");
            all_valid = false;
        }

        all_valid
    }

    // Missing artifacts degrade to "validation incomplete" rather
    // than erroring; other store failures propagate.
    fn read_leaves_soft(&self, snapshot_id: &str) -> Result<Vec<StoredLeaf>> {
        match self.store.read_leaves(snapshot_id) {
            Ok(leaves) => Ok(leaves),
            Err(crate::errors::StoreError::SnapshotMissing(_)) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_reserve_soft(&self, snapshot_id: &str) -> Result<Option<ReserveRecord>> {
        match self.store.read_reserve(snapshot_id) {
            Ok(reserve) => Ok(Some(reserve)),
            Err(crate::errors::StoreError::SnapshotMissing(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bitcoin::Network;
    use tempfile::TempDir;

    use super::*;
    use crate::anchor::{estimate_fee, AnchorKey, AnchorWriter};
    use crate::chain::{SpendableOutput, TransactionInfo};
    use crate::types::{AccountBalance, LeafRecord, ReserveRecord};
    use bitcoin::hashes::Hash;

    /// In-memory chain holding broadcast transactions
    struct MemoryChain {
        txs: Mutex<HashMap<Txid, Vec<u8>>>,
        confirmed: bool,
    }

    impl MemoryChain {
        fn new(confirmed: bool) -> Self {
            Self { txs: Mutex::new(HashMap::new()), confirmed }
        }

        fn insert(&self, tx: &Transaction) -> Txid {
            let txid = tx.compute_txid();
            self.txs
                .lock()
                .expect("mutex should not be poisoned")
                .insert(txid, bitcoin::consensus::encode::serialize(tx));
            txid
        }
    }

    #[async_trait]
    impl ChainClient for MemoryChain {
        async fn list_utxos(
            &self,
            _address: &bitcoin::Address,
        ) -> std::result::Result<Vec<SpendableOutput>, ChainError> {
            Ok(vec![])
        }

        async fn fee_estimate(&self) -> std::result::Result<u64, ChainError> { Ok(2) }

        async fn raw_transaction(
            &self,
            txid: Txid,
        ) -> std::result::Result<Vec<u8>, ChainError> {
            self.txs
                .lock()
                .expect("mutex should not be poisoned")
                .get(&txid)
                .cloned()
                .ok_or_else(|| ChainError::InvalidResponse("unknown txid".to_string()))
        }

        async fn transaction(
            &self,
            _txid: Txid,
        ) -> std::result::Result<TransactionInfo, ChainError> {
            Ok(TransactionInfo {
                confirmed: self.confirmed,
                block_height: self.confirmed.then_some(87_000),
                inputs: vec![],
                outputs: vec![],
            })
        }

        async fn broadcast(&self, _raw_tx: &[u8]) -> std::result::Result<Txid, ChainError> {
            unimplemented!("not used in verifier tests")
        }
    }

    fn sample_leaves() -> Vec<LeafRecord> {
        vec![
            LeafRecord::with_nonce(
                AccountBalance {
                    account_id: "u1".to_string(),
                    token_code: "USD".to_string(),
                    balance: "500000".to_string(),
                },
                "abcd1234abcd1234abcd1234abcd1234".to_string(),
            ),
            LeafRecord::with_nonce(
                AccountBalance {
                    account_id: "u2".to_string(),
                    token_code: "EUR".to_string(),
                    balance: "250".to_string(),
                },
                "00112233445566778899aabbccddeeff".to_string(),
            ),
        ]
    }

    /// Builds a stored snapshot and an anchor transaction for it,
    /// returning the verifier-ready pieces
    fn anchored_snapshot(
        chain: &MemoryChain,
        store: &SnapshotStore,
    ) -> (Txid, Vec<LeafRecord>, ReserveRecord) {
        let leaves = sample_leaves();
        let reserve = ReserveRecord::from_raw(
            r#"{"available":[{"amount":750250,"currency":"usd"}],"pending":[],"livemode":false}"#
                .to_string(),
        );
        let mut hashes: Vec<_> = leaves.iter().map(LeafRecord::leaf_hash).collect();
        hashes.push(reserve.hash);
        let root = MerkleTree::build(&hashes).expect("build should succeed").root();

        let key = AnchorKey::generate(Network::Testnet);
        let writer = AnchorWriter::new(Arc::new(MemoryChain::new(true)), key);
        let utxo =
            SpendableOutput { txid: Txid::from_byte_array([0x22; 32]), vout: 0, value: 40_000 };
        let tx = writer
            .build_signed_transaction(&utxo, estimate_fee(2), root)
            .expect("build should succeed");
        let txid = chain.insert(&tx);

        store
            .write("2026-08-30", &leaves, &reserve, root, &txid.to_string())
            .expect("write should succeed");
        (txid, leaves, reserve)
    }

    #[tokio::test]
    async fn test_valid_snapshot_verifies_end_to_end() {
        let dir = TempDir::new().expect("temp dir should be created");
        let store = SnapshotStore::new(dir.path());
        let chain = Arc::new(MemoryChain::new(true));
        let (txid, _, _) = anchored_snapshot(&chain, &store);
        let verifier = TransactionVerifier::new(chain, store);

        let result = verifier.verify(txid).await.expect("verification should succeed");

        assert!(result.confirmed);
        assert_eq!(result.block_height, Some(87_000));
        assert!(result.snapshot_found);
        assert_eq!(result.snapshot_id.as_deref(), Some("2026-08-30"));
        assert!(result.snapshot_validation_complete);
        assert!(result.is_valid);
        assert_eq!(
            result.root_comparison,
            Some(RootComparison {
                rebuilt_vs_stored: true,
                rebuilt_vs_chain: true,
                stored_vs_chain: true,
            })
        );
        assert_eq!(result.proofs_valid, Some(true));
    }

    #[tokio::test]
    async fn test_unknown_txid_reports_snapshot_not_found() {
        let dir = TempDir::new().expect("temp dir should be created");
        let store = SnapshotStore::new(dir.path());
        let chain = Arc::new(MemoryChain::new(true));
        let _ = anchored_snapshot(&chain, &store);

        // Anchor a different root the store knows nothing about
        let foreign_root = sha256(b"unrelated root");
        let key = AnchorKey::generate(Network::Testnet);
        let writer = AnchorWriter::new(chain.clone(), key);
        let utxo =
            SpendableOutput { txid: Txid::from_byte_array([0x33; 32]), vout: 0, value: 30_000 };
        let foreign_tx = writer
            .build_signed_transaction(&utxo, estimate_fee(2), foreign_root)
            .expect("build should succeed");
        let foreign_txid = chain.insert(&foreign_tx);

        let verifier = TransactionVerifier::new(chain, store);
        let result =
            verifier.verify(foreign_txid).await.expect("verification should succeed");

        assert!(result.confirmed); // on-chain state is irrelevant here
        assert!(!result.snapshot_found);
        assert!(!result.snapshot_validation_complete);
        assert!(!result.is_valid);
        assert_eq!(result.snapshot_id, None);
    }

    #[tokio::test]
    async fn test_unconfirmed_transaction_is_soft_invalid() {
        let dir = TempDir::new().expect("temp dir should be created");
        let store = SnapshotStore::new(dir.path());
        let chain = Arc::new(MemoryChain::new(false));
        let (txid, _, _) = anchored_snapshot(&chain, &store);
        let verifier = TransactionVerifier::new(chain, store);

        let result = verifier.verify(txid).await.expect("verification should succeed");

        assert!(!result.confirmed);
        assert_eq!(result.block_height, None);
        assert!(result.snapshot_found);
        assert!(result.snapshot_validation_complete);
        assert!(!result.is_valid); // unconfirmed gates validity
        assert_eq!(result.proofs_valid, Some(true));
    }

    #[tokio::test]
    async fn test_tampered_leaf_fails_its_proof_only() {
        let dir = TempDir::new().expect("temp dir should be created");
        let store = SnapshotStore::new(dir.path());
        let chain = Arc::new(MemoryChain::new(true));
        let (txid, leaves, _) = anchored_snapshot(&chain, &store);

        // Inflate the first leaf's balance without touching its hash
        let csv_path = dir.path().join("2026-08-30").join("liabilities.csv");
        let csv = std::fs::read_to_string(&csv_path).expect("file should exist");
        let tampered = csv.replace(":USD:500000", ":USD:999999");
        assert_ne!(tampered, csv);
        std::fs::write(&csv_path, tampered).expect("write should succeed");

        let verifier = TransactionVerifier::new(chain, store.clone());
        let result = verifier.verify(txid).await.expect("verification should succeed");

        // Current interpretation: aggregate flags are untouched by a
        // per-leaf failure; the strict signal lives in proofs_valid.
        assert!(result.snapshot_validation_complete);
        assert!(result.is_valid);
        assert_eq!(result.proofs_valid, Some(false));
        assert_eq!(
            result.root_comparison,
            Some(RootComparison {
                rebuilt_vs_stored: true,
                rebuilt_vs_chain: true,
                stored_vs_chain: true,
            })
        );

        // The untampered leaf still proves against the rebuilt root
        let stored = store.read_leaves("2026-08-30").expect("read should succeed");
        let intact = &stored[1];
        assert_eq!(sha256(&intact.raw), leaves[1].leaf_hash());
    }

    #[tokio::test]
    async fn test_missing_reserve_artifact_leaves_validation_incomplete() {
        let dir = TempDir::new().expect("temp dir should be created");
        let store = SnapshotStore::new(dir.path());
        let chain = Arc::new(MemoryChain::new(true));
        let (txid, _, _) = anchored_snapshot(&chain, &store);

        std::fs::remove_file(dir.path().join("2026-08-30").join("stripe_balance.json"))
            .expect("remove should succeed");

        let verifier = TransactionVerifier::new(chain, store);
        let result = verifier.verify(txid).await.expect("verification should succeed");

        assert!(result.snapshot_found);
        assert!(!result.snapshot_validation_complete);
        assert!(!result.is_valid);
        assert_eq!(result.proofs_valid, None);
    }
}
