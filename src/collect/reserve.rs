//! Reserve collector

use tracing::debug;

use super::ReserveSource;
use crate::errors::CollectError;
use crate::types::ReserveRecord;

/// Collects the single reserve leaf of a snapshot.
///
/// The balance is serialized exactly once, at collection time; that
/// serialization is what gets hashed and what gets persisted, so the
/// stored artifact and the leaf hash can never disagree. Third
/// parties re-deriving the hash must reproduce the same key order —
/// the typed [`ReserveBalance`](crate::types::ReserveBalance) fixes
/// it by field declaration.
///
/// # Errors
/// * `CollectError::ReserveUnavailable` - if the custodian call
///   fails; fatal to the generation run, no partial snapshot without
///   a reserve leaf is permitted
pub async fn collect_reserve<S: ReserveSource + ?Sized>(
    source: &S,
) -> Result<ReserveRecord, CollectError> {
    let balance = source.reserve_snapshot().await?;
    let raw = serde_json::to_string(&balance)
        .map_err(|e| CollectError::ReserveSerialization(e.to_string()))?;
    debug!(bytes = raw.len(), "reserve balance serialized");

    Ok(ReserveRecord::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::types::{ReserveBalance, ReserveFunds};
    use crate::utils::sha256;

    struct FixedReserve(ReserveBalance);

    #[async_trait]
    impl ReserveSource for FixedReserve {
        async fn reserve_snapshot(&self) -> Result<ReserveBalance, CollectError> {
            Ok(self.0.clone())
        }
    }

    struct UnavailableReserve;

    #[async_trait]
    impl ReserveSource for UnavailableReserve {
        async fn reserve_snapshot(&self) -> Result<ReserveBalance, CollectError> {
            Err(CollectError::ReserveUnavailable("processor timeout".to_string()))
        }
    }

    #[tokio::test]
    async fn test_record_hash_commits_to_serialization() {
        let source = FixedReserve(ReserveBalance {
            available: vec![ReserveFunds { amount: 250_000, currency: "usd".to_string() }],
            pending: vec![ReserveFunds { amount: 1_000, currency: "eur".to_string() }],
            livemode: true,
        });

        let record = collect_reserve(&source).await.expect("collection should succeed");

        assert_eq!(record.hash, sha256(&record.raw));
        // Determinism: the same balance serializes to the same record
        let again = collect_reserve(&source).await.expect("collection should succeed");
        assert_eq!(again, record);
    }

    #[tokio::test]
    async fn test_unavailable_reserve_is_fatal() {
        let error =
            collect_reserve(&UnavailableReserve).await.expect_err("failure should propagate");

        assert_eq!(error, CollectError::ReserveUnavailable("processor timeout".to_string()));
    }
}
