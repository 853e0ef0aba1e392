//! Error types for Upkeep operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Query failed on {table}: {reason}")]
    QueryFailed { table: &'static str, reason: String },

    #[error("Unique constraint violated on {table}: {key}")]
    UniqueViolation { table: &'static str, key: String },

    #[error("Foreign key violated on {table}: {key}")]
    ForeignKeyViolation { table: &'static str, key: String },

    /// A referenced entity does not exist.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Field {field} exceeds {max} characters")]
    TooLong { field: String, max: usize },

    #[error("Arithmetic overflow computing {field}")]
    Overflow { field: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Order placement errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("Spare parts not found: {ids:?}")]
    SparePartsNotFound { ids: Vec<i64> },

    #[error(
        "Insufficient stock for '{name}' (SKU: {sku}). Available: {available}, Requested: {requested}"
    )]
    InsufficientStock {
        spare_part_id: i64,
        name: String,
        sku: String,
        available: i32,
        requested: i64,
    },
}

/// Master error type for all Upkeep errors.
#[derive(Debug, Clone, Error)]
pub enum UpkeepError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),
}

/// Result type alias for Upkeep operations.
pub type UpkeepResult<T> = Result<T, UpkeepError>;

// =============================================================================
// TESTS
// =============================================================================
