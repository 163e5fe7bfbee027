//! Liability collector

use tracing::debug;

use super::LiabilitySource;
use crate::errors::CollectError;
use crate::types::LeafRecord;

/// Collects one salted liability leaf per (account, token) pair.
///
/// Every row the source reports becomes a leaf, zero balances
/// included — eliding them would leave holes in the auditable
/// liability set. Each leaf gets a fresh random nonce; callers that
/// want users to self-verify later must hand the nonce to the user
/// out-of-band.
///
/// # Errors
/// * `CollectError::LiabilitySource` - if the source fails; fatal to
///   the generation run
pub async fn collect_liabilities<S: LiabilitySource + ?Sized>(
    source: &S,
    token_codes: &[String],
) -> Result<Vec<LeafRecord>, CollectError> {
    let rows = source.list_account_balances(token_codes).await?;
    debug!(rows = rows.len(), "liability rows fetched");

    Ok(rows.into_iter().map(LeafRecord::new).collect())
}
