//! Idempotency tracking records.
//!
//! A [`IdempotencyRecord`] remembers the serialized response of the first
//! successful run of a guarded operation, keyed by the caller-supplied
//! [`RequestId`]. Records are written once and never updated; whether a
//! record still deduplicates is decided at read time by [`IdempotencyRecord::is_active`].

use crate::error::ValidationError;
use crate::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Maximum length of a request identifier (`processed_requests.request_id`).
pub const MAX_REQUEST_ID_LEN: usize = 100;

// ============================================================================
// REQUEST ID
// ============================================================================

/// Caller-supplied idempotency token. Opaque, non-blank, at most
/// [`MAX_REQUEST_ID_LEN`] characters, no control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestId(String);

impl RequestId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "request_id".to_string(),
            });
        }
        if raw.chars().count() > MAX_REQUEST_ID_LEN {
            return Err(ValidationError::TooLong {
                field: "request_id".to_string(),
                max: MAX_REQUEST_ID_LEN,
            });
        }
        // Postgres text columns cannot hold NUL.
        if raw.chars().any(char::is_control) {
            return Err(ValidationError::invalid(
                "request_id",
                "must not contain control characters",
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RequestId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for RequestId {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// RESPONSE SNAPSHOT
// ============================================================================

/// Serialized response of a guarded operation.
///
/// Kept as the exact JSON text produced on first success so that replays are
/// byte-identical to the original response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseSnapshot(String);

impl ResponseSnapshot {
    /// Serialize a response value.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_string(value).map(Self)
    }

    /// Wrap text previously produced by [`ResponseSnapshot::encode`].
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResponseSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// A processed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub request_id: RequestId,
    /// When the guarded operation first succeeded.
    pub created_at: Timestamp,
    pub response_snapshot: ResponseSnapshot,
}

impl IdempotencyRecord {
    pub fn new(request_id: RequestId, response_snapshot: ResponseSnapshot, created_at: Timestamp) -> Self {
        Self {
            request_id,
            created_at,
            response_snapshot,
        }
    }

    /// `now - created_at <= window`.
    ///
    /// A record created in the future relative to `now` (clock skew between
    /// writers) counts as active.
    pub fn is_active(&self, now: Timestamp, window: Duration) -> bool {
        let age = now.signed_duration_since(self.created_at);
        match age.to_std() {
            Ok(age) => age <= window,
            Err(_) => true,
        }
    }
}
