//! Upkeep Test Utilities
//!
//! Shared test infrastructure for the Upkeep workspace:
//! - Proptest generators for request ids, snapshots and order requests
//! - Fixtures for spare parts and the `abc-1` replay scenario
//! - Fault-injecting idempotency stores
//! - Assertions over `UpkeepResult`

// Re-export the in-memory stores from their source crate
pub use upkeep_storage::{
    IdempotencyStore, InMemoryIdempotencyStore, InMemoryOrderStore, InsertOutcome, OrderStore,
};

// Re-export core types for convenience
pub use upkeep_core::{
    Category, Clock, CreateServiceOrder, CreateServiceOrderItem, IdempotencyRecord, ManualClock,
    NewCategory, NewSparePart, OrderError, PageRequest, RequestId, ResponseSnapshot,
    ServiceOrder, SparePart, SparePartUpdate, StorageError, SystemClock, Timestamp, UpkeepError,
    UpkeepResult, ValidationError,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Upkeep inputs.

    use super::*;
    use proptest::prelude::*;

    /// Generate a valid request id (1..=100 visible characters).
    pub fn arb_request_id() -> impl Strategy<Value = RequestId> {
        "[a-zA-Z0-9][a-zA-Z0-9_.:-]{0,99}".prop_filter_map("valid request id", |raw| {
            RequestId::parse(raw).ok()
        })
    }

    /// Generate a raw request id string that must be rejected.
    pub fn arb_invalid_request_id() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            " {1,10}",
            "[a-z]{101,130}",
            "[a-z]{1,10}".prop_map(|prefix| format!("{}\u{0}", prefix)),
        ]
    }

    /// Generate a response snapshot holding an order-shaped JSON object.
    pub fn arb_snapshot() -> impl Strategy<Value = ResponseSnapshot> {
        (1i64..1_000_000, "[a-z ]{0,24}").prop_map(|(order_id, note)| {
            ResponseSnapshot::from_raw(
                serde_json::json!({ "order_id": order_id, "note": note }).to_string(),
            )
        })
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    /// Generate a valid SKU string.
    pub fn arb_sku() -> impl Strategy<Value = String> {
        ("[A-Z]{1,3}", "[A-Z]{2,4}", "[A-Z0-9]{1,5}", "[0-9]{1,4}")
            .prop_map(|(class, material, size, length)| {
                format!("{}-{}-{}-{}", class, material, size, length)
            })
    }

    /// Generate an order line against spare part ids `1..=max_part_id`.
    pub fn arb_order_item(max_part_id: i64) -> impl Strategy<Value = CreateServiceOrderItem> {
        (1..=max_part_id, 1i32..20).prop_map(|(spare_part_id, quantity)| {
            CreateServiceOrderItem {
                spare_part_id,
                quantity,
            }
        })
    }

    /// Generate a valid order creation request.
    pub fn arb_create_order(max_part_id: i64) -> impl Strategy<Value = CreateServiceOrder> {
        (
            arb_request_id(),
            prop::collection::vec(arb_order_item(max_part_id), 1..6),
        )
            .prop_map(|(request_id, items)| CreateServiceOrder {
                request_id: request_id.to_string(),
                items,
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Fixed inputs for common scenarios.

    use super::*;
    use chrono::TimeZone;

    /// Fixed instant used as `t = 0` by scenario tests.
    pub fn epoch() -> Timestamp {
        chrono::Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(chrono::Utc::now)
    }

    /// Manual clock starting at [`epoch`].
    pub fn manual_clock() -> ManualClock {
        ManualClock::new(epoch())
    }

    /// Request id of the replay scenario.
    pub fn abc_1() -> RequestId {
        RequestId::parse("abc-1").unwrap_or_else(|e| panic!("fixture request id: {e}"))
    }

    /// `{"order_id":42}` as stored by the first call of the replay scenario.
    pub fn order_42_snapshot() -> ResponseSnapshot {
        ResponseSnapshot::from_raw(r#"{"order_id":42}"#)
    }

    pub fn screw() -> NewSparePart {
        NewSparePart {
            name: "Tornillo hexagonal".to_string(),
            sku: "A-STL-M10-50".to_string(),
            price_cents: 100,
            stock: 100,
            category_id: None,
        }
    }

    pub fn nut() -> NewSparePart {
        NewSparePart {
            name: "Tuerca".to_string(),
            sku: "B-STL-M10-20".to_string(),
            price_cents: 50,
            stock: 200,
            category_id: None,
        }
    }

    /// A part with only a handful of units in stock.
    pub fn scarce_resistor() -> NewSparePart {
        NewSparePart {
            name: "Resistencia".to_string(),
            sku: "C-ELC-100R-1W".to_string(),
            price_cents: 25,
            stock: 5,
            category_id: None,
        }
    }

    /// Category for screws, nuts and washers.
    pub fn fasteners() -> NewCategory {
        NewCategory::new("Fasteners").with_description("Screws, nuts and washers")
    }

    /// Register [`screw`] and [`nut`], returning them in that order.
    pub async fn seed_inventory<O: OrderStore + ?Sized>(store: &O) -> UpkeepResult<(SparePart, SparePart)> {
        let screw = store.spare_part_insert(&screw()).await?;
        let nut = store.spare_part_insert(&nut()).await?;
        Ok((screw, nut))
    }

    /// 10 screws and 20 nuts: 10 x 1.00 + 20 x 0.50 = 20.00.
    pub fn screws_and_nuts_order(request_id: &str, screw_id: i64, nut_id: i64) -> CreateServiceOrder {
        CreateServiceOrder {
            request_id: request_id.to_string(),
            items: vec![
                CreateServiceOrderItem {
                    spare_part_id: screw_id,
                    quantity: 10,
                },
                CreateServiceOrderItem {
                    spare_part_id: nut_id,
                    quantity: 20,
                },
            ],
        }
    }
}

// ============================================================================
// FAULT-INJECTING STORES
// ============================================================================

/// Idempotency store whose backend is down.
///
/// With [`UnavailableIdempotencyStore::everywhere`] every call fails; with
/// [`UnavailableIdempotencyStore::on_insert`] lookups reach the wrapped
/// in-memory store and only inserts fail.
#[derive(Debug, Default)]
pub struct UnavailableIdempotencyStore {
    inner: InMemoryIdempotencyStore,
    lookups_fail: bool,
    attempts: AtomicU64,
}

impl UnavailableIdempotencyStore {
    pub fn everywhere() -> Self {
        Self {
            lookups_fail: true,
            ..Self::default()
        }
    }

    pub fn on_insert() -> Self {
        Self::default()
    }

    /// Calls that reached this store, failed or not.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn unavailable() -> UpkeepError {
        StorageError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl IdempotencyStore for UnavailableIdempotencyStore {
    async fn find(&self, request_id: &RequestId) -> UpkeepResult<Option<IdempotencyRecord>> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if self.lookups_fail {
            return Err(Self::unavailable());
        }
        self.inner.find(request_id).await
    }

    async fn insert(
        &self,
        _record: &IdempotencyRecord,
        _expired_before: Timestamp,
    ) -> UpkeepResult<InsertOutcome> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Err(Self::unavailable())
    }
}

/// Store where a competing caller wins the first insert race.
///
/// Just before the first `insert` reaches the wrapped store, a record with
/// the competitor's snapshot is inserted for the same request id, as if a
/// concurrent caller had finished first.
#[derive(Debug)]
pub struct PreemptingIdempotencyStore {
    inner: InMemoryIdempotencyStore,
    competitor: ResponseSnapshot,
    fired: AtomicBool,
}

impl PreemptingIdempotencyStore {
    pub fn new(competitor: ResponseSnapshot) -> Self {
        Self {
            inner: InMemoryIdempotencyStore::new(),
            competitor,
            fired: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &InMemoryIdempotencyStore {
        &self.inner
    }
}

#[async_trait]
impl IdempotencyStore for PreemptingIdempotencyStore {
    async fn find(&self, request_id: &RequestId) -> UpkeepResult<Option<IdempotencyRecord>> {
        self.inner.find(request_id).await
    }

    async fn insert(
        &self,
        record: &IdempotencyRecord,
        expired_before: Timestamp,
    ) -> UpkeepResult<InsertOutcome> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let winner = IdempotencyRecord::new(
                record.request_id.clone(),
                self.competitor.clone(),
                record.created_at,
            );
            self.inner.insert(&winner, expired_before).await?;
        }
        self.inner.insert(record, expired_before).await
    }
}

/// Store that reports every insert as a duplicate but never finds a record,
/// as if the winning row vanished between the insert and the re-read.
#[derive(Debug, Default)]
pub struct VanishingWinnerStore;

#[async_trait]
impl IdempotencyStore for VanishingWinnerStore {
    async fn find(&self, _request_id: &RequestId) -> UpkeepResult<Option<IdempotencyRecord>> {
        Ok(None)
    }

    async fn insert(
        &self,
        _record: &IdempotencyRecord,
        _expired_before: Timestamp,
    ) -> UpkeepResult<InsertOutcome> {
        Ok(InsertOutcome::Duplicate)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over Upkeep results.

    use super::*;

    /// Assert that a result is Ok.
    pub fn assert_ok<T: std::fmt::Debug>(result: &UpkeepResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a result is a storage error.
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &UpkeepResult<T>) {
        assert!(
            matches!(result, Err(UpkeepError::Storage(_))),
            "Expected StorageError, got: {:?}",
            result
        );
    }

    /// Assert that a result is a validation error.
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &UpkeepResult<T>) {
        assert!(
            matches!(result, Err(UpkeepError::Validation(_))),
            "Expected ValidationError, got: {:?}",
            result
        );
    }

    /// Assert that a result reports insufficient stock for `spare_part_id`.
    pub fn assert_insufficient_stock<T: std::fmt::Debug>(result: &UpkeepResult<T>, spare_part_id: i64) {
        match result {
            Err(UpkeepError::Order(OrderError::InsufficientStock {
                spare_part_id: actual,
                ..
            })) => assert_eq!(*actual, spare_part_id),
            other => panic!("Expected InsufficientStock, got: {:?}", other),
        }
    }

    /// Assert that a result reports exactly `ids` as missing spare parts.
    pub fn assert_parts_not_found<T: std::fmt::Debug>(result: &UpkeepResult<T>, ids: &[i64]) {
        match result {
            Err(UpkeepError::Order(OrderError::SparePartsNotFound { ids: actual })) => {
                assert_eq!(actual.as_slice(), ids)
            }
            other => panic!("Expected SparePartsNotFound, got: {:?}", other),
        }
    }
}
