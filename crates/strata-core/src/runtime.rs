//! The request-path view of a collection: the target schema restricted to
//! what the latest migration snapshot confirms.
//!
//! Query builders use a [`RuntimeSchema`] so they never reference a table or
//! column that may not exist yet, even while configuration is ahead of the
//! last migration.

use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::diff::diff_schemas;
use crate::plan::TableOperation;
use crate::schema::CollectionSchema;

/// A column present in the target but missing from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingColumn {
    pub table: String,
    pub column: String,
}

/// Tables and columns the target declares but the snapshot lacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditiveDiff {
    pub missing_tables: Vec<String>,
    pub missing_columns: Vec<MissingColumn>,
}

impl AdditiveDiff {
    /// Returns `true` if the snapshot covers the whole target.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing_tables.is_empty() && self.missing_columns.is_empty()
    }
}

/// Computes what the target adds on top of the snapshot.
///
/// Attribute changes and removals are ignored: they never restrict what the
/// request path may use.
#[must_use]
pub fn additive_diff(target: &CollectionSchema, snapshot: &CollectionSchema) -> AdditiveDiff {
    let diff = diff_schemas(target, snapshot);
    let mut additive = AdditiveDiff::default();

    for operation in diff.plan.tables {
        match operation {
            TableOperation::CreateTable { table } => additive.missing_tables.push(table.name),
            TableOperation::AddColumns { table, columns } => {
                additive
                    .missing_columns
                    .extend(columns.into_iter().map(|c| MissingColumn {
                        table: table.clone(),
                        column: c.name,
                    }));
            }
            TableOperation::ModifyColumns { .. } => {}
        }
    }
    additive
}

/// A target schema filtered to the tables and columns a snapshot confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSchema {
    pub schema: CollectionSchema,
    /// What was filtered out, pending the next migration.
    pub pending: AdditiveDiff,
}

impl RuntimeSchema {
    /// Builds the runtime view of `target` given the latest `snapshot`.
    #[must_use]
    pub fn resolve(target: &CollectionSchema, snapshot: &CollectionSchema) -> Self {
        let pending = additive_diff(target, snapshot);

        let tables = target
            .tables
            .iter()
            .filter(|t| !pending.missing_tables.contains(&t.name))
            .map(|table| {
                let mut table = table.clone();
                table.columns.retain(|column| {
                    !pending
                        .missing_columns
                        .iter()
                        .any(|m| m.table == table.name && m.column == column.name)
                });
                table
            })
            .collect();

        Self {
            schema: CollectionSchema {
                key: target.key.clone(),
                tables,
            },
            pending,
        }
    }

    /// Returns `true` if configuration is ahead of the last migration.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl Deref for RuntimeSchema {
    type Target = CollectionSchema;

    fn deref(&self) -> &Self::Target {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrickConfig, CollectionConfig, FieldConfig};
    use crate::dialect::PostgresAdapter;
    use crate::fields::FieldRegistry;
    use crate::infer::infer_schema;

    fn schema(collection: &CollectionConfig) -> CollectionSchema {
        infer_schema(collection, &PostgresAdapter::new(), &FieldRegistry::default()).unwrap()
    }

    fn blog() -> CollectionConfig {
        CollectionConfig::new("blog").field(FieldConfig::new("title", "text"))
    }

    #[test]
    fn test_snapshot_covering_target_yields_target() {
        let target = schema(&blog());
        let runtime = RuntimeSchema::resolve(&target, &target);
        assert_eq!(runtime.schema, target);
        assert!(!runtime.is_pending());
    }

    #[test]
    fn test_unmigrated_field_is_hidden() {
        let snapshot = schema(&blog());
        let target = schema(&blog().field(FieldConfig::new("summary", "textarea")));

        let runtime = RuntimeSchema::resolve(&target, &snapshot);
        assert!(!runtime.has_column("strata__document__blog__fields", "_summary"));
        assert!(runtime.has_column("strata__document__blog__fields", "_title"));
        assert_eq!(
            runtime.pending.missing_columns,
            vec![MissingColumn {
                table: "strata__document__blog__fields".into(),
                column: "_summary".into(),
            }]
        );
    }

    #[test]
    fn test_unmigrated_brick_is_hidden() {
        let snapshot = schema(&blog());
        let target = schema(&blog().brick(BrickConfig::new("hero").field(FieldConfig::new(
            "heading", "text",
        ))));

        let runtime = RuntimeSchema::resolve(&target, &snapshot);
        assert!(runtime.table("strata__document__blog__hero").is_none());
        assert_eq!(runtime.pending.missing_tables, vec!["strata__document__blog__hero"]);
    }

    #[test]
    fn test_never_adds_what_snapshot_lacks_and_never_removes_what_it_has() {
        let snapshot = schema(&blog().field(FieldConfig::new("legacy", "text")));
        let target = schema(&blog().field(FieldConfig::new("fresh", "text")));

        let runtime = RuntimeSchema::resolve(&target, &snapshot);
        for table in &runtime.tables {
            let confirmed = snapshot.table(&table.name).unwrap();
            for column in &table.columns {
                assert!(confirmed.column(&column.name).is_some());
            }
        }
        // every target column the snapshot has is kept
        for table in &target.tables {
            for column in &table.columns {
                if snapshot.has_column(&table.name, &column.name) {
                    assert!(runtime.has_column(&table.name, &column.name));
                }
            }
        }
        assert!(!runtime.has_column("strata__document__blog__fields", "_legacy"));
    }

    #[test]
    fn test_runtime_schema_serializes() {
        let target = schema(&blog());
        let runtime = RuntimeSchema::resolve(&target, &CollectionSchema::new("blog"));
        let json = serde_json::to_string(&runtime).unwrap();
        let back: RuntimeSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, runtime);
        assert!(back.tables.is_empty());
    }
}
