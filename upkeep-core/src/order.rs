//! Service orders and spare-part inventory.

use crate::error::{OrderError, UpkeepResult, ValidationError};
use crate::idempotency::RequestId;
use crate::sku::Sku;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Maximum spare-part name length (`spare_parts.name`).
pub const MAX_SPARE_PART_NAME_LEN: usize = 150;

/// Page size used when a listing does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

// ============================================================================
// STATUS
// ============================================================================

/// Lifecycle status of a service order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceOrderStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ServiceOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceOrderStatus::Pending => "pending",
            ServiceOrderStatus::InProgress => "in_progress",
            ServiceOrderStatus::Completed => "completed",
            ServiceOrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ServiceOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceOrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ServiceOrderStatus::Pending),
            "in_progress" => Ok(ServiceOrderStatus::InProgress),
            "completed" => Ok(ServiceOrderStatus::Completed),
            "cancelled" => Ok(ServiceOrderStatus::Cancelled),
            other => Err(ValidationError::invalid(
                "status",
                format!("unknown service order status '{}'", other),
            )),
        }
    }
}

// ============================================================================
// SPARE PARTS
// ============================================================================

/// A stocked spare part. Prices are integer cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparePart {
    pub id: i64,
    pub name: String,
    pub sku: Sku,
    pub price_cents: i64,
    pub stock: i32,
    pub category_id: Option<i64>,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}

/// Input for registering a spare part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSparePart {
    pub name: String,
    pub sku: String,
    pub price_cents: i64,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub category_id: Option<i64>,
}

impl NewSparePart {
    /// Validate the input, returning the parsed SKU.
    pub fn validate(&self) -> Result<Sku, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "name".to_string(),
            });
        }
        if self.name.chars().count() > MAX_SPARE_PART_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "name".to_string(),
                max: MAX_SPARE_PART_NAME_LEN,
            });
        }
        if self.price_cents < 0 {
            return Err(ValidationError::invalid("price_cents", "must not be negative"));
        }
        if self.stock < 0 {
            return Err(ValidationError::invalid("stock", "must not be negative"));
        }
        Sku::parse(&self.sku)
    }
}

/// Partial update of a spare part. Absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparePartUpdate {
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub stock: Option<i32>,
}

impl SparePartUpdate {
    /// Restock to `stock` units, keeping the price.
    pub fn restock(stock: i32) -> Self {
        Self {
            stock: Some(stock),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.price_cents.is_none() && self.stock.is_none() {
            return Err(ValidationError::invalid(
                "spare_part",
                "No fields to update provided",
            ));
        }
        if self.price_cents.is_some_and(|price| price < 0) {
            return Err(ValidationError::invalid("price_cents", "must not be negative"));
        }
        if self.stock.is_some_and(|stock| stock < 0) {
            return Err(ValidationError::invalid("stock", "must not be negative"));
        }
        Ok(())
    }
}

/// Offset pagination for listings, ordered by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Number of records to skip.
    #[serde(default)]
    pub skip: u32,
    /// Maximum number of records to return.
    #[serde(default = "default_page_limit")]
    pub limit: u32,
}

fn default_page_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl PageRequest {
    pub fn new(skip: u32, limit: u32) -> Self {
        Self { skip, limit }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_LIMIT)
    }
}

// ============================================================================
// ORDERS
// ============================================================================

/// A line of a service order. `unit_price_cents` is the part price at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOrderItem {
    pub id: i64,
    pub order_id: i64,
    pub spare_part_id: i64,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub created_at: Timestamp,
}

/// A maintenance service order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub id: i64,
    pub request_id: RequestId,
    pub status: ServiceOrderStatus,
    pub total_cents: i64,
    pub items: Vec<ServiceOrderItem>,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}

/// Requested line of a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceOrderItem {
    pub spare_part_id: i64,
    pub quantity: i32,
}

/// Request to create a service order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceOrder {
    pub request_id: String,
    pub items: Vec<CreateServiceOrderItem>,
}

impl CreateServiceOrder {
    /// Validate the request shape, returning the parsed request id.
    pub fn validate(&self) -> Result<RequestId, ValidationError> {
        let request_id = RequestId::parse(self.request_id.clone())?;
        if self.items.is_empty() {
            return Err(ValidationError::invalid("items", "at least one item is required"));
        }
        if let Some(item) = self.items.iter().find(|item| item.quantity <= 0) {
            return Err(ValidationError::invalid(
                "quantity",
                format!(
                    "must be greater than 0 (spare part {} requested {})",
                    item.spare_part_id, item.quantity
                ),
            ));
        }
        Ok(request_id)
    }
}

// ============================================================================
// PRICING
// ============================================================================

/// A priced order line, ready to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub spare_part_id: i64,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

/// Result of pricing a request against current inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedOrder {
    pub lines: Vec<OrderLine>,
    pub total_cents: i64,
    /// Quantity to subtract from each spare part's stock.
    pub stock_deductions: BTreeMap<i64, i32>,
}

/// Price `items` against `parts` and check stock.
///
/// Every referenced part must be present in `parts`. Stock is compared with
/// the summed quantity per part, so a request listing the same part twice
/// cannot overdraw it.
pub fn price_order(
    items: &[CreateServiceOrderItem],
    parts: &HashMap<i64, SparePart>,
) -> UpkeepResult<PricedOrder> {
    let missing: Vec<i64> = items
        .iter()
        .map(|item| item.spare_part_id)
        .filter(|id| !parts.contains_key(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !missing.is_empty() {
        return Err(OrderError::SparePartsNotFound { ids: missing }.into());
    }

    let mut requested: BTreeMap<i64, i64> = BTreeMap::new();
    for item in items {
        *requested.entry(item.spare_part_id).or_default() += i64::from(item.quantity);
    }

    let mut stock_deductions = BTreeMap::new();
    for (&spare_part_id, &quantity) in &requested {
        let part = &parts[&spare_part_id];
        if i64::from(part.stock) < quantity {
            return Err(OrderError::InsufficientStock {
                spare_part_id,
                name: part.name.clone(),
                sku: part.sku.to_string(),
                available: part.stock,
                requested: quantity,
            }
            .into());
        }
        // Bounded by `part.stock`, so it fits.
        stock_deductions.insert(spare_part_id, quantity as i32);
    }

    let mut lines = Vec::with_capacity(items.len());
    let mut total_cents: i64 = 0;
    for item in items {
        let unit_price_cents = parts[&item.spare_part_id].price_cents;
        total_cents = unit_price_cents
            .checked_mul(i64::from(item.quantity))
            .and_then(|line| total_cents.checked_add(line))
            .ok_or_else(|| ValidationError::Overflow {
                field: "total_cents".to_string(),
            })?;
        lines.push(OrderLine {
            spare_part_id: item.spare_part_id,
            quantity: item.quantity,
            unit_price_cents,
        });
    }

    Ok(PricedOrder {
        lines,
        total_cents,
        stock_deductions,
    })
}
