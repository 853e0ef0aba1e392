//! Error Types for the Upkeep Service
//!
//! This module defines error handling for the service layer:
//! - ServiceError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - conversions from the core, guard and database error types
//!
//! Errors serialize as JSON and carry the HTTP status a transport layer
//! should answer with.

use serde::{Deserialize, Serialize};
use std::fmt;
use upkeep_core::{OrderError, StorageError, UpkeepError, ValidationError};
use upkeep_guard::GuardError;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for service responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Requested quantity exceeds available stock
    InsufficientStock,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Entity with the same unique key already exists
    EntityAlreadyExists,

    /// A concurrent request won the idempotency record but it could not be read back
    IdempotencyConflict,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Unexpected internal error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Backing store is temporarily unavailable
    ServiceUnavailable,

    /// No connection could be acquired from the pool in time
    ConnectionPoolExhausted,
}

impl ErrorCode {
    /// HTTP status code for this error code.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::InvalidInput | ErrorCode::MissingField | ErrorCode::InsufficientStock => 400,

            ErrorCode::EntityNotFound => 404,

            ErrorCode::EntityAlreadyExists | ErrorCode::IdempotencyConflict => 409,

            ErrorCode::InternalError | ErrorCode::DatabaseError => 500,

            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => 503,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InsufficientStock => "Insufficient stock",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::IdempotencyConflict => "Concurrent request could not be resolved",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Connection pool exhausted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// SERVICE ERROR STRUCT
// ============================================================================

/// Structured error returned by every service operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (missing ids, stock levels)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.code.status_code()
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create an EntityNotFound error for an entity type and id.
    pub fn not_found(entity: &str, id: i64) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity, id),
        )
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceError {}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::RequiredFieldMissing { ref field } => {
                Self::new(ErrorCode::MissingField, err.to_string())
                    .with_details(serde_json::json!({ "field": field }))
            }
            other => Self::invalid_input(other.to_string()),
        }
    }
}

impl From<OrderError> for ServiceError {
    fn from(err: OrderError) -> Self {
        let message = err.to_string();
        match err {
            OrderError::SparePartsNotFound { ids } => Self::new(ErrorCode::EntityNotFound, message)
                .with_details(serde_json::json!({ "missing_spare_part_ids": ids })),
            OrderError::InsufficientStock {
                spare_part_id,
                available,
                requested,
                ..
            } => Self::new(ErrorCode::InsufficientStock, message).with_details(serde_json::json!({
                "spare_part_id": spare_part_id,
                "available": available,
                "requested": requested,
            })),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UniqueViolation { table, key } => Self::new(
                ErrorCode::EntityAlreadyExists,
                format!("{} already contains {}", table, key),
            ),
            StorageError::ForeignKeyViolation { table, key } => Self::invalid_input(format!(
                "{} references a row that does not exist ({})",
                table, key
            )),
            StorageError::NotFound { entity, id } => Self::not_found(entity, id),
            StorageError::Unavailable { reason } => {
                tracing::error!(reason = %reason, "Storage unavailable");
                Self::from_code(ErrorCode::ServiceUnavailable)
            }
            other => {
                // Full detail goes to the log only.
                tracing::error!(error = %other, "Storage error");
                Self::from_code(ErrorCode::DatabaseError)
            }
        }
    }
}

impl From<UpkeepError> for ServiceError {
    fn from(err: UpkeepError) -> Self {
        match err {
            UpkeepError::Storage(e) => e.into(),
            UpkeepError::Validation(e) => e.into(),
            UpkeepError::Order(e) => e.into(),
        }
    }
}

impl From<GuardError> for ServiceError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::InvalidArgument(e) => e.into(),
            GuardError::StorageUnavailable { reason } => {
                tracing::error!(reason = %reason, "Idempotency store unavailable");
                Self::from_code(ErrorCode::ServiceUnavailable)
            }
            GuardError::Serialization { reason } => {
                tracing::error!(reason = %reason, "Response snapshot serialization failed");
                Self::from_code(ErrorCode::InternalError)
            }
            GuardError::ConflictUnresolved { request_id } => {
                Self::from_code(ErrorCode::IdempotencyConflict)
                    .with_details(serde_json::json!({ "request_id": request_id }))
            }
        }
    }
}

/// Convert from tokio_postgres::Error to ServiceError.
impl From<tokio_postgres::Error> for ServiceError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        ServiceError::database_error("Database operation failed")
    }
}

/// Convert from deadpool_postgres::PoolError to ServiceError.
impl From<deadpool_postgres::PoolError> for ServiceError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                ServiceError::from_code(ErrorCode::ConnectionPoolExhausted)
            }
            deadpool_postgres::PoolError::Closed => {
                ServiceError::service_unavailable("Database connection pool is closed")
            }
            _ => ServiceError::database_error("Failed to acquire database connection"),
        }
    }
}

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
