//! Idempotency record storage.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use upkeep_core::{IdempotencyRecord, RequestId, Timestamp, UpkeepResult};

/// Outcome of [`IdempotencyStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record is now the stored record for its request id.
    Inserted,
    /// A record that is not older than the cutoff already holds the request id.
    Duplicate,
}

/// Durable storage for processed requests.
///
/// Implementations must make `insert` atomic with respect to other inserts
/// for the same request id: of two racing inserts, at most one reports
/// [`InsertOutcome::Inserted`].
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Point lookup by request id.
    async fn find(&self, request_id: &RequestId) -> UpkeepResult<Option<IdempotencyRecord>>;

    /// Insert `record` unless a record for the same request id exists whose
    /// `created_at` is at or after `expired_before`. An existing record older
    /// than `expired_before` is replaced.
    async fn insert(
        &self,
        record: &IdempotencyRecord,
        expired_before: Timestamp,
    ) -> UpkeepResult<InsertOutcome>;
}

#[async_trait]
impl<T: IdempotencyStore + ?Sized> IdempotencyStore for Arc<T> {
    async fn find(&self, request_id: &RequestId) -> UpkeepResult<Option<IdempotencyRecord>> {
        (**self).find(request_id).await
    }

    async fn insert(
        &self,
        record: &IdempotencyRecord,
        expired_before: Timestamp,
    ) -> UpkeepResult<InsertOutcome> {
        (**self).insert(record, expired_before).await
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory idempotency store used by default in tests.
///
/// The whole check-and-insert runs under one write lock, which plays the role
/// of the unique constraint on `processed_requests.request_id`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIdempotencyStore {
    records: Arc<RwLock<HashMap<RequestId, IdempotencyRecord>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, active or not.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Clear all stored records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn find(&self, request_id: &RequestId) -> UpkeepResult<Option<IdempotencyRecord>> {
        Ok(self.records.read().await.get(request_id).cloned())
    }

    async fn insert(
        &self,
        record: &IdempotencyRecord,
        expired_before: Timestamp,
    ) -> UpkeepResult<InsertOutcome> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(&record.request_id) {
            if existing.created_at >= expired_before {
                return Ok(InsertOutcome::Duplicate);
            }
            tracing::debug!(
                request_id = %record.request_id,
                previous_created_at = %existing.created_at,
                "Replacing expired idempotency record"
            );
        }
        records.insert(record.request_id.clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use upkeep_core::ResponseSnapshot;

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn record(id: &str, body: &str, created_at: Timestamp) -> IdempotencyRecord {
        IdempotencyRecord::new(
            RequestId::parse(id).unwrap(),
            ResponseSnapshot::from_raw(body),
            created_at,
        )
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let store = InMemoryIdempotencyStore::new();
        let id = RequestId::parse("nope").unwrap();
        assert!(store.find(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_then_find() {
        let store = InMemoryIdempotencyStore::new();
        let rec = record("abc-1", r#"{"order_id":42}"#, t0());

        let outcome = store.insert(&rec, t0() - Duration::seconds(60)).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(store.find(&rec.request_id).await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn test_insert_active_duplicate_keeps_original() {
        let store = InMemoryIdempotencyStore::new();
        let first = record("abc-1", r#"{"order_id":42}"#, t0());
        let second = record("abc-1", r#"{"order_id":43}"#, t0() + Duration::seconds(5));

        store.insert(&first, t0() - Duration::seconds(60)).await.unwrap();
        let outcome = store
            .insert(&second, second.created_at - Duration::seconds(60))
            .await
            .unwrap();

        assert_eq!(outcome, InsertOutcome::Duplicate);
        let stored = store.find(&first.request_id).await.unwrap().unwrap();
        assert_eq!(stored.response_snapshot.as_str(), r#"{"order_id":42}"#);
        assert_eq!(stored.created_at, t0());
    }

    #[tokio::test]
    async fn test_insert_replaces_expired_record() {
        let store = InMemoryIdempotencyStore::new();
        let first = record("abc-1", r#"{"order_id":42}"#, t0());
        let later = record("abc-1", r#"{"order_id":43}"#, t0() + Duration::seconds(70));

        store.insert(&first, t0() - Duration::seconds(60)).await.unwrap();
        let outcome = store
            .insert(&later, later.created_at - Duration::seconds(60))
            .await
            .unwrap();

        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(store.len().await, 1);
        let stored = store.find(&later.request_id).await.unwrap().unwrap();
        assert_eq!(stored, later);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryIdempotencyStore::new();
        store
            .insert(&record("a", "{}", t0()), t0())
            .await
            .unwrap();
        assert!(!store.is_empty().await);
        store.clear().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_single_winner() {
        let store = InMemoryIdempotencyStore::new();
        let mut handles = Vec::new();
        for n in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let rec = record("race", &format!(r#"{{"order_id":{}}}"#, n), t0());
                store.insert(&rec, t0() - Duration::seconds(60)).await
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == InsertOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.len().await, 1);
    }
}
