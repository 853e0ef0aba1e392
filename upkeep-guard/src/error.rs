//! Guard error types.

use thiserror::Error;
use upkeep_core::{UpkeepError, ValidationError};

/// Errors surfaced by [`crate::IdempotencyGuard`].
///
/// A lost insert race is not an error: it is reported as
/// [`crate::RecordOutcome::Conflict`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    #[error("Idempotency store unavailable: {reason}")]
    StorageUnavailable { reason: String },

    #[error("Response snapshot serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Request {request_id} lost the insert race but no active record could be read back")]
    ConflictUnresolved { request_id: String },
}

impl GuardError {
    pub(crate) fn storage(err: UpkeepError) -> Self {
        Self::StorageUnavailable {
            reason: err.to_string(),
        }
    }

    pub(crate) fn serialization(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;
