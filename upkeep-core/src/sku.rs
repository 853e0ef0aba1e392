//! Stock keeping unit codes.
//!
//! SKUs follow `[CLASS]-[MATERIAL]-[SIZE]-[LENGTH]`, e.g. `A-STL-M10-50`.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum SKU length accepted by the `spare_parts.sku` column.
pub const MAX_SKU_LEN: usize = 50;

const SKU_COMPONENTS: usize = 4;

/// A validated SKU.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = raw.split('-').collect();
        if parts.len() != SKU_COMPONENTS {
            return Err(ValidationError::invalid(
                "sku",
                format!(
                    "Invalid SKU format. Expected format: [CLASS]-[MATERIAL]-[SIZE]-[LENGTH], but got '{}'",
                    raw
                ),
            ));
        }
        if parts.iter().any(|part| part.trim().is_empty()) {
            return Err(ValidationError::invalid(
                "sku",
                "All SKU components must be non-empty",
            ));
        }
        if raw.chars().count() > MAX_SKU_LEN {
            return Err(ValidationError::TooLong {
                field: "sku".to_string(),
                max: MAX_SKU_LEN,
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Sku {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Sku {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self {
        sku.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
