//! Snapshot generation orchestrator
//!
//! A linear pipeline with no retries and no branching:
//!
//! ```text
//! check balance -> collect liabilities -> collect reserve
//!     -> build tree -> anchor -> write artifacts
//! ```
//!
//! Any stage failure aborts the run. Artifacts are written last, so a
//! failed anchor never leaves a snapshot directory holding a false
//! txid. The converse window is real: once broadcast, a transaction
//! cannot be recalled, so a crash between anchoring and the artifact
//! write leaves an on-chain anchor with no matching snapshot — the
//! verifier reports such a txid as `snapshot_found: false`.

use std::sync::Arc;

use bitcoin::{Network, Txid};
use chrono::Utc;
use tracing::info;

use crate::anchor::{AnchorKey, AnchorWriter, MIN_ANCHOR_BALANCE_SATS};
use crate::chain::{address_balance, ChainClient};
use crate::collect::{collect_liabilities, collect_reserve, LiabilitySource, ReserveSource};
use crate::errors::{GenerationError, Result};
use crate::merkle::MerkleTree;
use crate::store::SnapshotStore;
use crate::types::{LeafRecord, ReserveRecord};
use crate::utils::{to_hex, Bytes32};

/// Configuration for a snapshot generator.
///
/// Built explicitly at startup — no ambient globals, no module-load
/// side effects.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Bitcoin network the anchor address lives on
    pub network: Network,
    /// Token codes to collect liabilities for
    pub token_codes: Vec<String>,
    /// Whether to broadcast the anchor transaction.
    ///
    /// With `false` the transaction is built and signed but kept
    /// local; artifacts record its real txid.
    pub broadcast: bool,
    /// Minimum anchor balance required before the run proceeds
    pub min_balance_sats: u64,
}

impl GeneratorConfig {
    /// Standard configuration for the given network and tokens
    pub fn new(network: Network, token_codes: Vec<String>) -> Self {
        Self { network, token_codes, broadcast: true, min_balance_sats: MIN_ANCHOR_BALANCE_SATS }
    }
}

/// One generated snapshot
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// Date-based snapshot id (UTC ISO date)
    pub id: String,
    /// Merkle root committed on-chain
    pub root: Bytes32,
    /// Id of the anchoring transaction
    pub txid: Txid,
    /// The salted liability leaves
    pub liability_leaves: Vec<LeafRecord>,
    /// The single reserve leaf
    pub reserve_leaf: ReserveRecord,
}

/// Composes the collectors, tree builder, anchor writer, and artifact
/// store into one generation pipeline
pub struct SnapshotGenerator {
    liabilities: Arc<dyn LiabilitySource>,
    reserve: Arc<dyn ReserveSource>,
    chain: Arc<dyn ChainClient>,
    writer: AnchorWriter,
    store: SnapshotStore,
    config: GeneratorConfig,
}

impl SnapshotGenerator {
    /// Creates a generator from its collaborators
    pub fn new(
        liabilities: Arc<dyn LiabilitySource>,
        reserve: Arc<dyn ReserveSource>,
        chain: Arc<dyn ChainClient>,
        key: AnchorKey,
        store: SnapshotStore,
        config: GeneratorConfig,
    ) -> Self {
        let writer = AnchorWriter::new(chain.clone(), key);
        Self { liabilities, reserve, chain, writer, store, config }
    }

    /// Generates and anchors one snapshot.
    ///
    /// The snapshot id is the current UTC calendar date; two runs on
    /// the same day collide on the same directory (one generation run
    /// per day is assumed).
    ///
    /// # Errors
    /// Every stage failure is fatal and aborts the run with nothing
    /// written:
    /// * `GenerationError::InsufficientFunds` - anchor balance below
    ///   the configured minimum, checked before any other external
    ///   call
    /// * `CollectError::*` - liability or reserve source failure
    /// * `AnchorError::*` / `ChainError::BroadcastFailed` - anchoring
    ///   failure
    /// * `StoreError::*` - artifact write failure (the anchor
    ///   transaction may already be on-chain at this point)
    pub async fn generate(&self) -> Result<Snapshot> {
        let snapshot_id = today_utc();
        info!(snapshot_id, "snapshot generation started");

        let balance = address_balance(self.chain.as_ref(), self.writer.address()).await?;
        if balance < self.config.min_balance_sats {
            return Err(GenerationError::InsufficientFunds {
                balance,
                required: self.config.min_balance_sats,
            }
            .into());
        }

        let leaves = collect_liabilities(self.liabilities.as_ref(), &self.config.token_codes)
            .await?;
        info!(leaves = leaves.len(), "liability leaves generated");

        let reserve = collect_reserve(self.reserve.as_ref()).await?;

        let mut hashes: Vec<Bytes32> = leaves.iter().map(LeafRecord::leaf_hash).collect();
        hashes.push(reserve.hash);
        let tree = MerkleTree::build(&hashes)?;
        let root = tree.root();
        info!(root = %to_hex(root), "merkle root generated");

        let txid = self.writer.anchor_with_broadcast(root, self.config.broadcast).await?;

        self.store.write(&snapshot_id, &leaves, &reserve, root, &txid.to_string())?;
        info!(snapshot_id, %txid, "snapshot written");

        Ok(Snapshot { id: snapshot_id, root, txid, liability_leaves: leaves, reserve_leaf: reserve })
    }
}

/// Returns the current UTC calendar date as `YYYY-MM-DD`
pub fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
