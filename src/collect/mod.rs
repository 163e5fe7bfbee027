//! Liability and reserve collectors
//!
//! Both collectors consume external sources through async traits so
//! the wallet SDK and the payment processor stay behind seams the
//! tests can mock. Collection is read-only: the only side effects are
//! the sources' own network calls.

use async_trait::async_trait;

use crate::errors::CollectError;
use crate::types::{AccountBalance, ReserveBalance};

mod liabilities;
mod reserve;

pub use liabilities::collect_liabilities;
pub use reserve::collect_reserve;

/// Source of per-account liability balances.
///
/// Implementations enumerate every custodial account and report one
/// row per (account, token) pair for the requested token codes,
/// zero-defaulting tokens an account does not hold. The per-account
/// fan-out is where generation latency lives; adapters should bound
/// their concurrency to cap external API load. Row order is
/// irrelevant — the Merkle tree sorts leaves at build time.
#[async_trait]
pub trait LiabilitySource: Send + Sync {
    /// Lists balances for all accounts across the given token codes
    async fn list_account_balances(
        &self,
        token_codes: &[String],
    ) -> Result<Vec<AccountBalance>, CollectError>;
}

/// Source of the custodian's reserve balance
#[async_trait]
pub trait ReserveSource: Send + Sync {
    /// Fetches a single snapshot of the custodian reserve balance
    async fn reserve_snapshot(&self) -> Result<ReserveBalance, CollectError>;
}
