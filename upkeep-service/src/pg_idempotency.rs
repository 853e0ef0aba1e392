//! PostgreSQL idempotency store over `processed_requests`.

use crate::db::{corrupt_row, pool_error, query_error};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use upkeep_core::{IdempotencyRecord, RequestId, ResponseSnapshot, Timestamp, UpkeepResult};
use upkeep_storage::{IdempotencyStore, InsertOutcome};

const TABLE: &str = "processed_requests";

// A conflicting row is overwritten only when it has expired; otherwise the
// statement returns no row and the insert is reported as a duplicate.
const INSERT_SQL: &str = "\
    INSERT INTO processed_requests (request_id, response_snapshot, created_at) \
    VALUES ($1, $2, $3) \
    ON CONFLICT (request_id) DO UPDATE \
        SET response_snapshot = EXCLUDED.response_snapshot, \
            created_at = EXCLUDED.created_at \
        WHERE processed_requests.created_at < $4 \
    RETURNING request_id";

const FIND_SQL: &str = "\
    SELECT request_id, response_snapshot, created_at \
    FROM processed_requests WHERE request_id = $1";

/// Idempotency store backed by the `processed_requests` table.
///
/// The primary key on `request_id` provides the insert atomicity the guard
/// relies on.
#[derive(Clone)]
pub struct PgIdempotencyStore {
    pool: Pool,
}

impl PgIdempotencyStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn find(&self, request_id: &RequestId) -> UpkeepResult<Option<IdempotencyRecord>> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let row = conn
            .query_opt(FIND_SQL, &[&request_id.as_str()])
            .await
            .map_err(|e| query_error(TABLE, e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stored_id: String = row.try_get("request_id").map_err(|e| corrupt_row(TABLE, e))?;
        let snapshot: String = row
            .try_get("response_snapshot")
            .map_err(|e| corrupt_row(TABLE, e))?;
        let created_at: Timestamp = row.try_get("created_at").map_err(|e| corrupt_row(TABLE, e))?;

        Ok(Some(IdempotencyRecord::new(
            RequestId::parse(stored_id).map_err(|e| corrupt_row(TABLE, e))?,
            ResponseSnapshot::from_raw(snapshot),
            created_at,
        )))
    }

    async fn insert(
        &self,
        record: &IdempotencyRecord,
        expired_before: Timestamp,
    ) -> UpkeepResult<InsertOutcome> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let row = conn
            .query_opt(
                INSERT_SQL,
                &[
                    &record.request_id.as_str(),
                    &record.response_snapshot.as_str(),
                    &record.created_at,
                    &expired_before,
                ],
            )
            .await
            .map_err(|e| query_error(TABLE, e))?;

        Ok(match row {
            Some(_) => InsertOutcome::Inserted,
            None => InsertOutcome::Duplicate,
        })
    }
}
