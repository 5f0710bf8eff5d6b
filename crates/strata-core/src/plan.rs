//! Migration plans: the operations needed to bring one collection's tables
//! from their current shape to the target shape.

use serde::{Deserialize, Serialize};

use crate::schema::{CollectionSchemaColumn, CollectionSchemaTable, DefaultValue, ForeignKey, LogicalType};

/// A changed attribute: `from` is the current value, `to` the target value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change<T> {
    pub from: T,
    pub to: T,
}

impl<T: PartialEq> Change<T> {
    /// Returns a change if the values differ.
    pub fn between(from: T, to: T) -> Option<Self> {
        (from != to).then_some(Self { from, to })
    }
}

/// Attribute-level differences of one column.
///
/// Only changed attributes are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnChange {
    pub column: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub logical_type: Option<Change<LogicalType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<Change<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Change<Option<DefaultValue>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<Change<Option<ForeignKey>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<Change<bool>>,
}

impl ColumnChange {
    #[must_use]
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            logical_type: None,
            nullable: None,
            default: None,
            foreign_key: None,
            unique: None,
        }
    }

    /// Returns `true` if no attribute changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.logical_type.is_none()
            && self.nullable.is_none()
            && self.default.is_none()
            && self.foreign_key.is_none()
            && self.unique.is_none()
    }

    /// Names of the changed attributes.
    #[must_use]
    pub fn attributes(&self) -> Vec<&'static str> {
        let mut attributes = Vec::new();
        if self.logical_type.is_some() {
            attributes.push("type");
        }
        if self.nullable.is_some() {
            attributes.push("nullable");
        }
        if self.default.is_some() {
            attributes.push("default");
        }
        if self.foreign_key.is_some() {
            attributes.push("foreign_key");
        }
        if self.unique.is_some() {
            attributes.push("unique");
        }
        attributes
    }
}

/// A single operation on one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableOperation {
    /// Creates a table with its full definition.
    CreateTable { table: CollectionSchemaTable },
    /// Adds columns to an existing table.
    AddColumns {
        table: String,
        columns: Vec<CollectionSchemaColumn>,
    },
    /// Column attribute changes. Reported, never executed.
    ModifyColumns {
        table: String,
        changes: Vec<ColumnChange>,
    },
}

impl TableOperation {
    /// Name of the table this operation targets.
    #[must_use]
    pub fn table_name(&self) -> &str {
        match self {
            Self::CreateTable { table } => &table.name,
            Self::AddColumns { table, .. } | Self::ModifyColumns { table, .. } => table,
        }
    }

    /// Returns `true` for operations the executor runs.
    #[must_use]
    pub const fn is_executable(&self) -> bool {
        !matches!(self, Self::ModifyColumns { .. })
    }

    /// Short description used in logs and CLI output.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::CreateTable { table } => {
                format!("create table {} ({} columns)", table.name, table.columns.len())
            }
            Self::AddColumns { table, columns } => {
                let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
                format!("add to {table}: {}", names.join(", "))
            }
            Self::ModifyColumns { table, changes } => {
                let names: Vec<String> = changes
                    .iter()
                    .map(|c| format!("{} [{}]", c.column, c.attributes().join(", ")))
                    .collect();
                format!("modify in {table}: {}", names.join(", "))
            }
        }
    }
}

/// Operations for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub collection_key: String,
    pub tables: Vec<TableOperation>,
}

impl MigrationPlan {
    #[must_use]
    pub fn new(collection_key: impl Into<String>) -> Self {
        Self {
            collection_key: collection_key.into(),
            tables: Vec::new(),
        }
    }

    /// Returns `true` if the plan contains no operations at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns `true` if the plan contains operations the executor will run.
    #[must_use]
    pub fn has_executable(&self) -> bool {
        self.tables.iter().any(TableOperation::is_executable)
    }

    /// Tables the plan creates.
    pub fn created_tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().filter_map(|op| match op {
            TableOperation::CreateTable { table } => Some(table.name.as_str()),
            _ => None,
        })
    }

    /// Total number of columns added to existing tables.
    #[must_use]
    pub fn added_column_count(&self) -> usize {
        self.tables
            .iter()
            .map(|op| match op {
                TableOperation::AddColumns { columns, .. } => columns.len(),
                _ => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_between() {
        assert_eq!(Change::between(1, 1), None);
        assert_eq!(Change::between(1, 2), Some(Change { from: 1, to: 2 }));
    }

    #[test]
    fn test_column_change_attributes() {
        let mut change = ColumnChange::new("_title");
        assert!(change.is_empty());

        change.nullable = Change::between(true, false);
        change.unique = Change::between(false, true);
        assert!(!change.is_empty());
        assert_eq!(change.attributes(), vec!["nullable", "unique"]);
    }

    #[test]
    fn test_operation_serialization_is_tagged() {
        let op = TableOperation::ModifyColumns {
            table: "t".into(),
            changes: vec![ColumnChange {
                nullable: Change::between(true, false),
                ..ColumnChange::new("c")
            }],
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["kind"], "modify_columns");
        assert_eq!(json["changes"][0]["nullable"]["to"], false);
        assert!(json["changes"][0].get("type").is_none());
        assert!(!op.is_executable());
        assert_eq!(op.describe(), "modify in t: c [nullable]");
    }
}
