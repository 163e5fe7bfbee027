//! Error types for the Reserve Attest library
//!
//! Generation failures are hard errors: the run aborts and no partial
//! snapshot is persisted. Verification outcomes that are normal states
//! of the protocol (snapshot not found, transaction unconfirmed) are
//! *not* errors; they fold into
//! [`ValidationResult`](crate::types::ValidationResult) fields. No
//! component retries automatically; external I/O failures bubble up
//! immediately.

use thiserror::Error;

/// The main error type for the Reserve Attest library
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Snapshot generation errors
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Liability or reserve collection errors
    #[error(transparent)]
    Collect(#[from] CollectError),

    /// Merkle tree errors
    #[error(transparent)]
    Merkle(#[from] MerkleError),

    /// Chain anchor errors
    #[error(transparent)]
    Anchor(#[from] AnchorError),

    /// Chain client errors
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Snapshot artifact store errors
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors that abort a snapshot generation run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GenerationError {
    /// Anchor wallet balance is below the minimum needed to cover fees.
    ///
    /// Checked eagerly, before any liability fan-out or external side
    /// effect.
    #[error("insufficient anchor balance: {balance} sats < required {required} sats")]
    InsufficientFunds {
        /// Total spendable balance at the anchor address in satoshis
        balance: u64,
        /// Minimum balance required to attempt anchoring
        required: u64,
    },
}

/// Errors that can occur while collecting liabilities or reserves
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CollectError {
    /// The custodian reserve balance could not be fetched.
    ///
    /// Fatal to snapshot generation: a snapshot without a reserve leaf
    /// is not permitted.
    #[error("reserve balance unavailable: {0}")]
    ReserveUnavailable(String),

    /// The liability source failed to enumerate account balances
    #[error("liability source failed: {0}")]
    LiabilitySource(String),

    /// The reserve balance could not be serialized canonically
    #[error("reserve serialization failed: {0}")]
    ReserveSerialization(String),
}

/// Errors that can occur during Merkle tree operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MerkleError {
    /// A tree cannot be built from zero leaves.
    ///
    /// An empty leaf set is a configuration error: every snapshot has
    /// at least the reserve leaf.
    #[error("cannot build a Merkle tree from an empty leaf set")]
    EmptyLeafSet,

    /// The requested leaf hash is not present in the tree
    #[error("leaf hash not found in tree: {0}")]
    LeafNotFound(String),
}

/// Errors that can occur while anchoring a root on-chain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnchorError {
    /// The anchor address has no spendable outputs
    #[error("no spendable outputs for anchor address")]
    NoSpendableOutputs,

    /// The selected input cannot cover the estimated fee
    #[error("anchor input {value} sats cannot cover fee {fee} sats")]
    FeeExceedsInput {
        /// Value of the selected input in satoshis
        value: u64,
        /// Estimated fee in satoshis
        fee: u64,
    },

    /// Taproot sighash computation failed
    #[error("sighash computation failed: {0}")]
    Sighash(String),

    /// The anchor private key could not be decoded or does not match
    /// the configured network
    #[error("invalid anchor key: {0}")]
    InvalidKey(String),
}

/// Errors that can occur while talking to the chain client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChainError {
    /// Transport-level failure (connection, timeout, DNS)
    #[error("chain client transport error: {0}")]
    Transport(String),

    /// The chain API answered with a non-success status
    #[error("chain client returned status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body, as returned by the API
        body: String,
    },

    /// The chain API response could not be decoded
    #[error("invalid chain client response: {0}")]
    InvalidResponse(String),

    /// The signed transaction was rejected at broadcast.
    ///
    /// Fatal, no retry. A signed transaction may still exist outside
    /// this process; operators handle that out-of-band.
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
}

/// Errors that can occur in the snapshot artifact store
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// Filesystem I/O failure
    #[error("snapshot store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A liability leaf row does not have the `hash,raw` shape
    #[error("malformed leaf row in {snapshot_id}: {row}")]
    MalformedLeafRow {
        /// Snapshot the row belongs to
        snapshot_id: String,
        /// The offending row
        row: String,
    },

    /// A root binding record could not be parsed
    #[error("malformed root binding for snapshot {snapshot_id}: {reason}")]
    MalformedBinding {
        /// Snapshot the binding belongs to
        snapshot_id: String,
        /// Parse failure detail
        reason: String,
    },

    /// A hex-encoded hash could not be decoded
    #[error("malformed hash: {0}")]
    MalformedHash(String),

    /// The requested snapshot directory does not exist
    #[error("snapshot not found in store: {0}")]
    SnapshotMissing(String),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
