//! Guard protocol tests against the in-memory and fault-injecting stores.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use upkeep_guard::{CheckOutcome, GuardError, Guarded, IdempotencyGuard, RecordOutcome};
use upkeep_test_utils::{
    fixtures, generators, InMemoryIdempotencyStore, ManualClock, PreemptingIdempotencyStore,
    ResponseSnapshot, UnavailableIdempotencyStore, VanishingWinnerStore,
};

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Receipt {
    order_id: i64,
}

fn in_memory_guard() -> (IdempotencyGuard<InMemoryIdempotencyStore, ManualClock>, ManualClock) {
    let clock = fixtures::manual_clock();
    (
        IdempotencyGuard::with_clock(InMemoryIdempotencyStore::new(), clock.clone()),
        clock,
    )
}

#[tokio::test]
async fn abc_1_replays_within_window_and_reruns_after() {
    let (guard, clock) = in_memory_guard();
    let next_order_id = &AtomicUsize::new(42);
    let place = move || async move {
        let order_id = next_order_id.fetch_add(1, Ordering::SeqCst) as i64;
        Ok::<_, GuardError>(Receipt { order_id })
    };

    // Caller A at t=0.
    let a = guard.execute("abc-1", WINDOW, place).await.unwrap();
    assert!(!a.is_replay());
    assert_eq!(a.snapshot().as_str(), r#"{"order_id":42}"#);

    // Caller B at t=5.
    clock.advance(Duration::from_secs(5));
    let b = guard.execute("abc-1", WINDOW, place).await.unwrap();
    assert!(b.is_replay());
    assert_eq!(b.value(), &Receipt { order_id: 42 });

    // Caller C at t=70.
    clock.advance(Duration::from_secs(65));
    assert_eq!(guard.check("abc-1", WINDOW).await.unwrap(), CheckOutcome::Miss);
    let c = guard.execute("abc-1", WINDOW, place).await.unwrap();
    assert!(!c.is_replay());
    assert_eq!(c.into_inner(), Receipt { order_id: 43 });
}

#[tokio::test]
async fn immediate_retry_has_one_side_effect_and_identical_bytes() {
    let (guard, _) = in_memory_guard();
    let runs = &AtomicUsize::new(0);
    let op = move || async move {
        runs.fetch_add(1, Ordering::SeqCst);
        Ok::<_, GuardError>(Receipt { order_id: 7 })
    };

    let first = guard.execute("r", WINDOW, op).await.unwrap();
    let second = guard.execute("r", WINDOW, op).await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(first.snapshot().as_bytes(), second.snapshot().as_bytes());
    assert!(second.is_replay());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_records_single_winner_and_convergence() {
    let (guard, _) = in_memory_guard();
    let guard = Arc::new(guard);

    let mut handles = Vec::new();
    for n in 0..2 {
        let guard = Arc::clone(&guard);
        handles.push(tokio::spawn(async move {
            let snapshot = ResponseSnapshot::from_raw(format!(r#"{{"order_id":{}}}"#, n));
            guard.record("race", snapshot, WINDOW).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }
    assert_eq!(
        outcomes.iter().filter(|o| **o == RecordOutcome::Recorded).count(),
        1
    );
    assert_eq!(
        outcomes.iter().filter(|o| **o == RecordOutcome::Conflict).count(),
        1
    );

    let a = guard.check("race", WINDOW).await.unwrap();
    let b = guard.check("race", WINDOW).await.unwrap();
    assert!(matches!(a, CheckOutcome::Hit(_)));
    assert_eq!(a, b);
    assert_eq!(guard.metrics().snapshot().conflicts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_executes_return_one_response() {
    let (guard, _) = in_memory_guard();
    let guard = Arc::new(guard);
    let counter = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let guard = Arc::clone(&guard);
        let counter = Arc::clone(&counter);
        handles.push(tokio::spawn(async move {
            guard
                .execute("burst", WINDOW, || async move {
                    let order_id = counter.fetch_add(1, Ordering::SeqCst) as i64 + 1;
                    Ok::<_, GuardError>(Receipt { order_id })
                })
                .await
        }));
    }

    let mut snapshots = Vec::new();
    for handle in handles {
        let guarded: Guarded<Receipt> = handle.await.unwrap().unwrap();
        snapshots.push(guarded.snapshot().clone());
    }
    assert!(snapshots.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(guard.metrics().snapshot().recorded, 1);
}

#[tokio::test]
async fn lost_race_returns_winner_snapshot() {
    let store = PreemptingIdempotencyStore::new(fixtures::order_42_snapshot());
    let guard = IdempotencyGuard::with_clock(store, fixtures::manual_clock());

    let guarded = guard
        .execute("abc-1", WINDOW, || async {
            Ok::<_, GuardError>(Receipt { order_id: 43 })
        })
        .await
        .unwrap();

    assert!(guarded.is_replay());
    assert_eq!(guarded.value(), &Receipt { order_id: 42 });
    assert_eq!(guarded.snapshot(), &fixtures::order_42_snapshot());
}

#[tokio::test]
async fn vanished_winner_is_unresolved() {
    let guard = IdempotencyGuard::with_clock(VanishingWinnerStore, fixtures::manual_clock());

    let err = guard
        .execute("abc-1", WINDOW, || async {
            Ok::<_, GuardError>(Receipt { order_id: 1 })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, GuardError::ConflictUnresolved { .. }));
}

#[tokio::test]
async fn store_down_on_check_fails_without_running() {
    let guard = IdempotencyGuard::new(UnavailableIdempotencyStore::everywhere());
    let runs = &AtomicUsize::new(0);

    let err = guard
        .execute("abc-1", WINDOW, move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok::<_, GuardError>(Receipt { order_id: 1 })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, GuardError::StorageUnavailable { .. }));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn control_characters_rejected_before_storage() {
    let guard = IdempotencyGuard::new(UnavailableIdempotencyStore::everywhere());
    let runs = &AtomicUsize::new(0);

    let err = guard
        .execute("abc\u{0}1", WINDOW, move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok::<_, GuardError>(Receipt { order_id: 1 })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, GuardError::InvalidArgument(_)));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(guard.store().attempts(), 0);
}

#[tokio::test]
async fn store_down_on_record_surfaces_error() {
    let guard = IdempotencyGuard::new(UnavailableIdempotencyStore::on_insert());

    let err = guard
        .execute("abc-1", WINDOW, || async {
            Ok::<_, GuardError>(Receipt { order_id: 1 })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, GuardError::StorageUnavailable { .. }));
    let metrics = guard.metrics().snapshot();
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.storage_failures, 1);
    assert_eq!(guard.store().attempts(), 2);
}

#[tokio::test]
async fn operation_error_records_nothing() {
    let (guard, _) = in_memory_guard();

    let err = guard
        .execute("abc-1", WINDOW, || async {
            Err::<Receipt, _>(GuardError::StorageUnavailable {
                reason: "downstream".to_string(),
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, GuardError::StorageUnavailable { .. }));
    assert!(guard.store().is_empty().await);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_record_then_check_hits_inside_window(
        request_id in generators::arb_request_id(),
        snapshot in generators::arb_snapshot(),
        start in generators::arb_timestamp(),
        elapsed in 0u64..=60,
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (guard, clock) = in_memory_guard();
        clock.set(start);

        let (recorded, checked) = rt.block_on(async {
            let recorded = guard.record(&request_id, snapshot.clone(), WINDOW).await.unwrap();
            clock.advance(Duration::from_secs(elapsed));
            (recorded, guard.check(&request_id, WINDOW).await.unwrap())
        });

        prop_assert_eq!(recorded, RecordOutcome::Recorded);
        prop_assert_eq!(checked, CheckOutcome::Hit(snapshot));
    }

    #[test]
    fn prop_invalid_request_id_rejected(raw in generators::arb_invalid_request_id()) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (guard, _) = in_memory_guard();
        let result = rt.block_on(guard.check(&raw, WINDOW));
        prop_assert!(matches!(result, Err(GuardError::InvalidArgument(_))));
    }
}
