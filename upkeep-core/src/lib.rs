//! Upkeep Core - Entity Types
//!
//! Data structures shared by every Upkeep crate: idempotency records,
//! service orders, spare parts, categories, the clock abstraction and the error enums.
//! Storage and the guard itself live in `upkeep-storage` and `upkeep-guard`.

use chrono::{DateTime, Utc};

pub mod category;
pub mod clock;
pub mod error;
pub mod idempotency;
pub mod order;
pub mod sku;

// ============================================================================
// SHARED TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use category::{
    Category, NewCategory, MAX_CATEGORY_DESCRIPTION_LEN, MAX_CATEGORY_NAME_LEN,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{OrderError, StorageError, UpkeepError, UpkeepResult, ValidationError};
pub use idempotency::{IdempotencyRecord, RequestId, ResponseSnapshot, MAX_REQUEST_ID_LEN};
pub use order::{
    price_order, CreateServiceOrder, CreateServiceOrderItem, NewSparePart, OrderLine,
    PageRequest, PricedOrder, ServiceOrder, ServiceOrderItem, ServiceOrderStatus, SparePart,
    SparePartUpdate, DEFAULT_PAGE_LIMIT, MAX_SPARE_PART_NAME_LEN,
};
pub use sku::{Sku, MAX_SKU_LEN};
