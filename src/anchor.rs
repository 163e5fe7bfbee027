//! Chain anchor writer
//!
//! Commits a 32-byte Merkle root on-chain: selects a spendable output
//! at the anchor address, estimates the fee, builds a single-input
//! transaction with a change output and a zero-value OP_RETURN
//! carrying the root, signs it with a taproot key-path Schnorr
//! signature, and broadcasts it.
//!
//! Input policy is deliberately primitive: the first listed output is
//! spent, whole. No coin selection, no consolidation — a wallet
//! accumulating many small outputs will eventually need out-of-band
//! consolidation. Broadcast failures are fatal and never retried
//! here; retries are a caller concern.

use std::sync::Arc;

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::key::{Keypair, TapTweak};
use bitcoin::secp256k1::{Message, Secp256k1, XOnlyPublicKey};
use bitcoin::sighash::{Prevouts, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, PrivateKey, ScriptBuf, Sequence, TapSighashType,
    Transaction, TxIn, TxOut, Txid, Witness,
};
use tracing::{debug, info};

use crate::chain::{ChainClient, SpendableOutput};
use crate::errors::{AnchorError, Result};
use crate::utils::{to_hex, Bytes32};

/// Minimum spendable balance required before a generation run will
/// attempt anchoring, in satoshis
pub const MIN_ANCHOR_BALANCE_SATS: u64 = 500;

/// Fee-rate safety floor in sats per vbyte
pub const FEE_RATE_FLOOR_SAT_VB: u64 = 2;

/// Assumed size of the anchor transaction in vbytes.
///
/// One taproot key-spend input, one change output, one OP_RETURN
/// output. A fixed estimate is used instead of measuring the signed
/// transaction; the buffer below absorbs the slack.
pub const ESTIMATED_TX_VSIZE: u64 = 150;

// 10% fee buffer over the size estimate
const FEE_BUFFER_NUM: u64 = 11;
const FEE_BUFFER_DEN: u64 = 10;

/// The single static taproot key controlling the anchor address.
///
/// Key-path-only: the derived P2TR address has no script tree, so
/// every spend is a plain Schnorr key-spend signature.
#[derive(Clone)]
pub struct AnchorKey {
    keypair: Keypair,
    network: Network,
    address: Address,
}

impl AnchorKey {
    /// Decodes an anchor key from WIF.
    ///
    /// # Errors
    /// * `AnchorError::InvalidKey` - if the WIF is malformed or was
    ///   encoded for a different network kind
    pub fn from_wif(wif: &str, network: Network) -> Result<Self> {
        let private_key =
            PrivateKey::from_wif(wif).map_err(|e| AnchorError::InvalidKey(e.to_string()))?;
        if private_key.network != network.into() {
            return Err(AnchorError::InvalidKey(format!(
                "WIF network kind does not match {network}"
            ))
            .into());
        }
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &private_key.inner);
        Ok(Self::from_keypair(keypair, network))
    }

    /// Generates a fresh random anchor key.
    ///
    /// Intended for provisioning a new anchor wallet; persist the WIF
    /// (`to_wif`) and fund the address before generating snapshots.
    pub fn generate(network: Network) -> Self {
        let secp = Secp256k1::new();
        let keypair = Keypair::new(&secp, &mut rand::thread_rng());
        Self::from_keypair(keypair, network)
    }

    fn from_keypair(keypair: Keypair, network: Network) -> Self {
        let secp = Secp256k1::new();
        let (internal_key, _parity) = XOnlyPublicKey::from_keypair(&keypair);
        let address = Address::p2tr(&secp, internal_key, None, network);
        Self { keypair, network, address }
    }

    /// Returns the key-path-only P2TR anchor address
    pub fn address(&self) -> &Address { &self.address }

    /// Returns the x-only public key behind the anchor address
    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        XOnlyPublicKey::from_keypair(&self.keypair).0
    }

    /// Exports the key as WIF for persistence
    pub fn to_wif(&self) -> String {
        PrivateKey::new(self.keypair.secret_key(), self.network).to_wif()
    }
}

impl std::fmt::Debug for AnchorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("AnchorKey")
            .field("network", &self.network)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Writes Merkle roots on-chain as OP_RETURN anchors
pub struct AnchorWriter {
    chain: Arc<dyn ChainClient>,
    key: AnchorKey,
}

impl AnchorWriter {
    /// Creates a writer over a chain client and the anchor key
    pub fn new(chain: Arc<dyn ChainClient>, key: AnchorKey) -> Self { Self { chain, key } }

    /// Returns the anchor address this writer spends from
    pub fn address(&self) -> &Address { self.key.address() }

    /// Anchors a root on-chain and returns the transaction id.
    ///
    /// # Errors
    /// * `AnchorError::NoSpendableOutputs` - the anchor address has no
    ///   UTXOs
    /// * `AnchorError::FeeExceedsInput` - the selected input cannot
    ///   cover the estimated fee
    /// * `ChainError::BroadcastFailed` - the network rejected the
    ///   signed transaction; a signed copy may still exist outside
    ///   this process
    pub async fn anchor(&self, root: Bytes32) -> Result<Txid> {
        self.anchor_with_broadcast(root, true).await
    }

    /// Anchors a root, optionally skipping the broadcast.
    ///
    /// With `broadcast: false` the transaction is still fully built
    /// and signed and its real txid is returned, but nothing leaves
    /// the process — a dry run for operators checking fees and
    /// balances.
    pub async fn anchor_with_broadcast(&self, root: Bytes32, broadcast: bool) -> Result<Txid> {
        let utxos = self.chain.list_utxos(self.key.address()).await?;
        let Some(utxo) = utxos.first() else {
            return Err(AnchorError::NoSpendableOutputs.into());
        };
        debug!(txid = %utxo.txid, vout = utxo.vout, value = utxo.value, "selected anchor input");

        let fee_rate = self.chain.fee_estimate().await?;
        let fee = estimate_fee(fee_rate);

        let tx = self.build_signed_transaction(utxo, fee, root)?;
        let txid = tx.compute_txid();
        info!(
            %txid,
            root = %to_hex(root),
            fee,
            fee_rate = fee_rate.max(FEE_RATE_FLOOR_SAT_VB),
            broadcast,
            "anchor transaction built"
        );

        if broadcast {
            let raw = bitcoin::consensus::encode::serialize(&tx);
            let broadcast_txid = self.chain.broadcast(&raw).await?;
            info!(txid = %broadcast_txid, "anchor transaction broadcast");
            Ok(broadcast_txid)
        } else {
            Ok(txid)
        }
    }

    /// Builds and signs the anchor transaction spending the given
    /// output.
    ///
    /// Layout is fixed: input 0 spends the selected UTXO with RBF
    /// signaling; output 0 returns (input − fee) to the anchor
    /// address; output 1 is the zero-value OP_RETURN carrying the
    /// root.
    pub fn build_signed_transaction(
        &self,
        utxo: &SpendableOutput,
        fee: u64,
        root: Bytes32,
    ) -> Result<Transaction> {
        if utxo.value <= fee {
            return Err(AnchorError::FeeExceedsInput { value: utxo.value, fee }.into());
        }

        let anchor_script = self.key.address().script_pubkey();

        let input = TxIn {
            previous_output: OutPoint { txid: utxo.txid, vout: utxo.vout },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        };

        let change = TxOut {
            value: Amount::from_sat(utxo.value - fee),
            script_pubkey: anchor_script.clone(),
        };
        let op_return =
            TxOut { value: Amount::ZERO, script_pubkey: ScriptBuf::new_op_return(root) };

        let mut tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![input],
            output: vec![change, op_return],
        };

        // BIP-341 key-path spend over the single prevout
        let prevout =
            TxOut { value: Amount::from_sat(utxo.value), script_pubkey: anchor_script };
        let sighash = SighashCache::new(&tx)
            .taproot_key_spend_signature_hash(
                0,
                &Prevouts::All(&[prevout]),
                TapSighashType::Default,
            )
            .map_err(|e| AnchorError::Sighash(e.to_string()))?;

        let secp = Secp256k1::new();
        let tweaked = self.key.keypair.tap_tweak(&secp, None);
        let signature = secp.sign_schnorr(
            &Message::from_digest(sighash.to_byte_array()),
            &tweaked.to_inner(),
        );
        tx.input[0].witness = Witness::p2tr_key_spend(&bitcoin::taproot::Signature {
            signature,
            sighash_type: TapSighashType::Default,
        });

        Ok(tx)
    }
}

/// Estimates the anchor transaction fee in satoshis.
///
/// The network rate is floored at [`FEE_RATE_FLOOR_SAT_VB`], applied
/// to the fixed [`ESTIMATED_TX_VSIZE`], and padded by 10%, rounded
/// up.
pub fn estimate_fee(fee_rate_sat_vb: u64) -> u64 {
    let rate = fee_rate_sat_vb.max(FEE_RATE_FLOOR_SAT_VB);
    ESTIMATED_TX_VSIZE
        .saturating_mul(rate)
        .saturating_mul(FEE_BUFFER_NUM)
        .div_ceil(FEE_BUFFER_DEN)
}

/// Extracts the anchored root from a transaction's OP_RETURN output.
///
/// Returns `None` when no output is an OP_RETURN push of exactly 32
/// bytes.
pub fn extract_anchored_root(tx: &Transaction) -> Option<Bytes32> {
    tx.output.iter().find_map(|out| {
        if !out.script_pubkey.is_op_return() {
            return None;
        }
        let mut instructions = out.script_pubkey.instructions();
        let _op_return = instructions.next()?.ok()?;
        let push = instructions.next()?.ok()?;
        let bytes = push.push_bytes()?.as_bytes();
        Bytes32::try_from(bytes).ok()
    })
}
