//! The idempotency guard.

use crate::error::{GuardError, GuardResult};
use crate::metrics::GuardMetrics;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use upkeep_core::{Clock, IdempotencyRecord, RequestId, ResponseSnapshot, SystemClock, Timestamp};
use upkeep_storage::{IdempotencyStore, InsertOutcome};

// ============================================================================
// OUTCOMES
// ============================================================================

/// Result of [`IdempotencyGuard::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// An active record exists; return its snapshot without re-running.
    Hit(ResponseSnapshot),
    /// No active record; the caller should perform the operation.
    Miss,
}

/// Result of [`IdempotencyGuard::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The snapshot is now the active record for this request id.
    Recorded,
    /// Another caller holds an active record for this request id.
    Conflict,
}

/// Response produced by [`IdempotencyGuard::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    /// The operation ran in this call and its snapshot was recorded.
    Fresh { value: T, snapshot: ResponseSnapshot },
    /// The snapshot of an earlier run was returned.
    Replayed { value: T, snapshot: ResponseSnapshot },
}

impl<T> Guarded<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Fresh { value, .. } | Self::Replayed { value, .. } => value,
        }
    }

    /// The stored response text, identical for every call sharing a record.
    pub fn snapshot(&self) -> &ResponseSnapshot {
        match self {
            Self::Fresh { snapshot, .. } | Self::Replayed { snapshot, .. } => snapshot,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Self::Replayed { .. })
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Fresh { value, .. } | Self::Replayed { value, .. } => value,
        }
    }
}

// ============================================================================
// GUARD
// ============================================================================

/// Deduplicates repeated submissions of the same request within a window.
///
/// Correctness under concurrency rests on the store's insert being atomic per
/// request id. No lock is held while the guarded operation runs, so two
/// callers may both run it; only one record is ever accepted and both callers
/// return that record's snapshot.
#[derive(Debug)]
pub struct IdempotencyGuard<S, C = SystemClock> {
    store: S,
    clock: C,
    metrics: GuardMetrics,
}

impl<S: IdempotencyStore> IdempotencyGuard<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: IdempotencyStore, C: Clock> IdempotencyGuard<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            metrics: GuardMetrics::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn metrics(&self) -> &GuardMetrics {
        &self.metrics
    }

    /// Look up an active record for `request_id`.
    ///
    /// Records older than `window` are reported as [`CheckOutcome::Miss`].
    /// Store failures are returned as errors; the check is never skipped.
    pub async fn check(
        &self,
        request_id: impl AsRef<str>,
        window: Duration,
    ) -> GuardResult<CheckOutcome> {
        let request_id = RequestId::parse(request_id.as_ref())?;
        let now = self.clock.now();
        expired_before(now, window)?;

        let found = self.store.find(&request_id).await.map_err(|e| {
            GuardMetrics::incr(&self.metrics.storage_failures);
            tracing::warn!(
                request_id = %request_id,
                error = %e,
                "Idempotency check failed"
            );
            GuardError::storage(e)
        })?;

        match found {
            Some(record) if record.is_active(now, window) => {
                GuardMetrics::incr(&self.metrics.hits);
                tracing::debug!(
                    request_id = %request_id,
                    created_at = %record.created_at,
                    "Idempotency hit, replaying stored response"
                );
                Ok(CheckOutcome::Hit(record.response_snapshot))
            }
            Some(record) => {
                GuardMetrics::incr(&self.metrics.misses);
                tracing::debug!(
                    request_id = %request_id,
                    created_at = %record.created_at,
                    window_secs = window.as_secs(),
                    "Idempotency record expired"
                );
                Ok(CheckOutcome::Miss)
            }
            None => {
                GuardMetrics::incr(&self.metrics.misses);
                Ok(CheckOutcome::Miss)
            }
        }
    }

    /// Record the snapshot of an operation that ran after a [`CheckOutcome::Miss`].
    ///
    /// `window` must be the one used for the preceding check: an existing
    /// record older than it is replaced, an active one yields
    /// [`RecordOutcome::Conflict`].
    pub async fn record(
        &self,
        request_id: impl AsRef<str>,
        snapshot: ResponseSnapshot,
        window: Duration,
    ) -> GuardResult<RecordOutcome> {
        let request_id = RequestId::parse(request_id.as_ref())?;
        let now = self.clock.now();
        let cutoff = expired_before(now, window)?;
        let record = IdempotencyRecord::new(request_id, snapshot, now);

        match self.store.insert(&record, cutoff).await {
            Ok(InsertOutcome::Inserted) => {
                GuardMetrics::incr(&self.metrics.recorded);
                tracing::debug!(request_id = %record.request_id, "Idempotency record stored");
                Ok(RecordOutcome::Recorded)
            }
            Ok(InsertOutcome::Duplicate) => {
                GuardMetrics::incr(&self.metrics.conflicts);
                tracing::info!(
                    request_id = %record.request_id,
                    "Concurrent request recorded first"
                );
                Ok(RecordOutcome::Conflict)
            }
            Err(e) => {
                GuardMetrics::incr(&self.metrics.storage_failures);
                // The operation already ran; its effect is not deduplicated.
                tracing::error!(
                    request_id = %record.request_id,
                    error = %e,
                    reconciliation_candidate = true,
                    "Failed to store idempotency record after operation succeeded"
                );
                Err(GuardError::storage(e))
            }
        }
    }

    /// Run `operation` at most once per `request_id` within `window`.
    ///
    /// On a hit the stored snapshot is decoded and returned. On a miss the
    /// operation runs and its serialized result is recorded; if another
    /// caller recorded first, this caller's result is discarded and the
    /// winner's snapshot returned instead.
    pub async fn execute<T, E, F, Fut>(
        &self,
        request_id: impl AsRef<str>,
        window: Duration,
        operation: F,
    ) -> Result<Guarded<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<GuardError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let request_id = RequestId::parse(request_id.as_ref()).map_err(GuardError::from)?;

        if let CheckOutcome::Hit(snapshot) = self.check(&request_id, window).await? {
            return Ok(replay(snapshot)?);
        }

        let value = operation().await?;
        let snapshot = ResponseSnapshot::encode(&value).map_err(GuardError::serialization)?;

        match self.record(&request_id, snapshot.clone(), window).await? {
            RecordOutcome::Recorded => Ok(Guarded::Fresh { value, snapshot }),
            RecordOutcome::Conflict => match self.check(&request_id, window).await? {
                CheckOutcome::Hit(winner) => Ok(replay(winner)?),
                CheckOutcome::Miss => {
                    tracing::error!(
                        request_id = %request_id,
                        "Insert conflict but no active record on re-read"
                    );
                    Err(GuardError::ConflictUnresolved {
                        request_id: request_id.to_string(),
                    }
                    .into())
                }
            },
        }
    }
}

fn replay<T: DeserializeOwned>(snapshot: ResponseSnapshot) -> GuardResult<Guarded<T>> {
    let value = snapshot.decode().map_err(GuardError::serialization)?;
    Ok(Guarded::Replayed { value, snapshot })
}

/// `now - window`, the cutoff below which a record no longer deduplicates.
fn expired_before(now: Timestamp, window: Duration) -> GuardResult<Timestamp> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            upkeep_core::ValidationError::invalid("window", "too large to apply to a timestamp")
                .into()
        })
}
