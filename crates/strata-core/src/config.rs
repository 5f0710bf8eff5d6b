//! Content-model configuration: collections, bricks and fields.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// The ordered list of configured collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

impl ContentConfig {
    #[must_use]
    pub const fn new(collections: Vec<CollectionConfig>) -> Self {
        Self { collections }
    }

    /// Looks up a collection by key.
    #[must_use]
    pub fn collection(&self, key: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| c.key == key)
    }

    /// Collection keys in configuration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(|c| c.key.as_str())
    }

    /// Rejects duplicate collection keys.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateKey`] on the first repeated key.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for key in self.keys() {
            if !seen.insert(key) {
                return Err(SchemaError::DuplicateKey {
                    key: key.to_string(),
                    scope: "collections".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A collection (content type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub key: String,
    /// Fields stored in the document-fields table.
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub bricks: Vec<BrickConfig>,
}

impl CollectionConfig {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: Vec::new(),
            bricks: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn brick(mut self, brick: BrickConfig) -> Self {
        self.bricks.push(brick);
        self
    }
}

/// A reusable group of fields attached to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickConfig {
    pub key: String,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl BrickConfig {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }
}

/// A single field.
///
/// `field_type` is a key into the [`FieldRegistry`](crate::fields::FieldRegistry).
/// Group types (repeaters) carry their child fields in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldConfig>,
}

impl FieldConfig {
    #[must_use]
    pub fn new(key: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field_type: field_type.into(),
            required: false,
            unique: false,
            default: None,
            fields: Vec::new(),
        }
    }

    /// Creates a repeater with the given child fields.
    #[must_use]
    pub fn repeater(key: impl Into<String>, fields: Vec<Self>) -> Self {
        Self {
            fields,
            ..Self::new(key, "repeater")
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }
}
