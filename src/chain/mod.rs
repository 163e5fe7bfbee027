//! Chain client contract
//!
//! The anchor writer and verifier never talk to a concrete chain SDK;
//! they consume the [`ChainClient`] trait. A thin adapter over a real
//! backend implements it ([`EsploraClient`] for mempool.space-style
//! REST APIs). All calls are single-attempt blocking I/O from the
//! caller's perspective: no retry, no backoff — callers impose their
//! own deadlines.

use async_trait::async_trait;
use bitcoin::{Address, Txid};

use crate::errors::ChainError;

mod esplora;

pub use esplora::EsploraClient;

/// A spendable output at an address, as listed by the chain backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpendableOutput {
    /// Transaction id of the funding transaction
    pub txid: Txid,
    /// Output index within the funding transaction
    pub vout: u32,
    /// Value in satoshis
    pub value: u64,
}

/// Summary of one input of a fetched transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInputSummary {
    /// Transaction id of the spent output
    pub txid: Txid,
    /// Index of the spent output
    pub vout: u32,
    /// Value of the spent output in satoshis, when the backend
    /// reports it
    pub value: Option<u64>,
}

/// Summary of one output of a fetched transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOutputSummary {
    /// Raw scriptPubKey bytes
    pub script_pubkey: Vec<u8>,
    /// Value in satoshis
    pub value: u64,
}

/// A fetched transaction with its confirmation status
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionInfo {
    /// Whether the transaction is included in a block
    pub confirmed: bool,
    /// Height of the confirming block, if confirmed
    pub block_height: Option<u32>,
    /// Input summaries
    pub inputs: Vec<TxInputSummary>,
    /// Output summaries
    pub outputs: Vec<TxOutputSummary>,
}

/// Contract for the external chain backend.
///
/// Composition over SDK extension: implementors hold a reference to
/// whatever real client they wrap and expose only the five calls this
/// library needs.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Lists spendable outputs for an address
    async fn list_utxos(&self, address: &Address) -> Result<Vec<SpendableOutput>, ChainError>;

    /// Returns the current recommended fee rate in sats per vbyte
    async fn fee_estimate(&self) -> Result<u64, ChainError>;

    /// Fetches the raw consensus-encoded bytes of a transaction
    async fn raw_transaction(&self, txid: Txid) -> Result<Vec<u8>, ChainError>;

    /// Fetches a transaction with its confirmation status
    async fn transaction(&self, txid: Txid) -> Result<TransactionInfo, ChainError>;

    /// Broadcasts a signed transaction, returning its txid.
    ///
    /// A broadcast cannot be cancelled after submission; failures are
    /// fatal and never retried here.
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid, ChainError>;
}

/// Sums the spendable output values at an address
pub async fn address_balance<C: ChainClient + ?Sized>(
    chain: &C,
    address: &Address,
) -> Result<u64, ChainError> {
    let utxos = chain.list_utxos(address).await?;
    Ok(utxos.iter().map(|u| u.value).sum())
}
