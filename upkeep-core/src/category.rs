//! Spare-part categories.

use crate::error::ValidationError;
use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Maximum category name length (`categories.name`).
pub const MAX_CATEGORY_NAME_LEN: usize = 100;

/// Maximum category description length (`categories.description`).
pub const MAX_CATEGORY_DESCRIPTION_LEN: usize = 255;

/// A category grouping spare parts. Names are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}

/// Input for creating a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "name".to_string(),
            });
        }
        if self.name.chars().count() > MAX_CATEGORY_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "name".to_string(),
                max: MAX_CATEGORY_NAME_LEN,
            });
        }
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_CATEGORY_DESCRIPTION_LEN {
                return Err(ValidationError::TooLong {
                    field: "description".to_string(),
                    max: MAX_CATEGORY_DESCRIPTION_LEN,
                });
            }
        }
        Ok(())
    }
}
