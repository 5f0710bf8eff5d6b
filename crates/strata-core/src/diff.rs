//! Structural diff engine.
//!
//! Compares a target [`CollectionSchema`] against a comparison schema (the
//! live database or the latest snapshot) and produces a [`MigrationPlan`].
//! Tables and columns are matched by name, so ordering never matters.
//! Anything present only in the comparison is reported as inactive and
//! never turned into a drop.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::naming;
use crate::plan::{Change, ColumnChange, MigrationPlan, TableOperation};
use crate::schema::{CollectionSchema, CollectionSchemaColumn, CollectionSchemaTable};

// ================================================================
// Public types
// ================================================================

/// A column that exists in the comparison but not in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactiveColumn {
    pub table: String,
    pub column: String,
}

/// Result of diffing one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDiff {
    pub plan: MigrationPlan,
    /// Comparison tables the target no longer declares.
    pub inactive_tables: Vec<String>,
    /// Comparison columns the target no longer declares.
    pub inactive_columns: Vec<InactiveColumn>,
}

impl CollectionDiff {
    /// Returns `true` if the schemas are structurally identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plan.is_empty() && self.inactive_tables.is_empty() && self.inactive_columns.is_empty()
    }
}

/// A collection whose tables exist in the database but which is no longer
/// configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactiveCollection {
    pub key: String,
    pub tables: Vec<String>,
}

// ================================================================
// Diffing
// ================================================================

/// Compares one column pair, recording only the attributes that differ.
///
/// `from` values come from `comparison`, `to` values from `target`.
#[must_use]
pub fn diff_column(
    target: &CollectionSchemaColumn,
    comparison: &CollectionSchemaColumn,
) -> Option<ColumnChange> {
    let change = ColumnChange {
        logical_type: Change::between(
            comparison.logical_type.clone(),
            target.logical_type.clone(),
        ),
        nullable: Change::between(comparison.nullable, target.nullable),
        default: Change::between(comparison.default.clone(), target.default.clone()),
        foreign_key: Change::between(
            comparison.foreign_key.clone(),
            target.foreign_key.clone(),
        ),
        unique: Change::between(comparison.unique, target.unique),
        ..ColumnChange::new(&target.name)
    };
    (!change.is_empty()).then_some(change)
}

/// Compares two tables with the same name.
///
/// Returns the operations for the table (at most one `AddColumns` and one
/// `ModifyColumns`) and the columns only the comparison has.
#[must_use]
pub fn diff_table(
    target: &CollectionSchemaTable,
    comparison: &CollectionSchemaTable,
) -> (Vec<TableOperation>, Vec<InactiveColumn>) {
    let existing: BTreeMap<&str, &CollectionSchemaColumn> = comparison
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c))
        .collect();

    let mut added = Vec::new();
    let mut changes = Vec::new();
    for column in &target.columns {
        match existing.get(column.name.as_str()) {
            None => added.push(column.clone()),
            Some(current) => changes.extend(diff_column(column, current)),
        }
    }

    let declared: BTreeSet<&str> = target.column_names().collect();
    let inactive = comparison
        .columns
        .iter()
        .filter(|c| !declared.contains(c.name.as_str()))
        .map(|c| InactiveColumn {
            table: target.name.clone(),
            column: c.name.clone(),
        })
        .collect();

    let mut operations = Vec::new();
    if !added.is_empty() {
        operations.push(TableOperation::AddColumns {
            table: target.name.clone(),
            columns: added,
        });
    }
    if !changes.is_empty() {
        operations.push(TableOperation::ModifyColumns {
            table: target.name.clone(),
            changes,
        });
    }
    (operations, inactive)
}

/// Diffs a target schema against a comparison schema.
#[must_use]
pub fn diff_schemas(target: &CollectionSchema, comparison: &CollectionSchema) -> CollectionDiff {
    let existing: BTreeMap<&str, &CollectionSchemaTable> = comparison
        .tables
        .iter()
        .map(|t| (t.name.as_str(), t))
        .collect();

    let mut plan = MigrationPlan::new(&target.key);
    let mut inactive_columns = Vec::new();

    for table in &target.tables {
        match existing.get(table.name.as_str()) {
            None => plan.tables.push(TableOperation::CreateTable {
                table: table.clone(),
            }),
            Some(current) => {
                let (operations, inactive) = diff_table(table, current);
                plan.tables.extend(operations);
                inactive_columns.extend(inactive);
            }
        }
    }

    let declared: BTreeSet<&str> = target.table_names().collect();
    let inactive_tables = comparison
        .table_names()
        .filter(|name| !declared.contains(name))
        .map(str::to_string)
        .collect();

    CollectionDiff {
        plan,
        inactive_tables,
        inactive_columns,
    }
}

/// Groups live tables of collections that are no longer configured.
///
/// Tables the namer does not recognise (snapshots, other applications) are
/// ignored. Result is ordered by collection key.
pub fn inactive_collections<'a>(
    active_keys: impl IntoIterator<Item = &'a str>,
    live_tables: impl IntoIterator<Item = &'a str>,
) -> Vec<InactiveCollection> {
    let active: BTreeSet<&str> = active_keys.into_iter().collect();
    let mut orphaned: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for table in live_tables {
        if let Some(collection) = naming::collection_of(table) {
            if !active.contains(collection) {
                orphaned.entry(collection).or_default().push(table.to_string());
            }
        }
    }

    orphaned
        .into_iter()
        .map(|(key, mut tables)| {
            tables.sort();
            InactiveCollection {
                key: key.to_string(),
                tables,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrickConfig, CollectionConfig, FieldConfig};
    use crate::dialect::SqliteAdapter;
    use crate::fields::FieldRegistry;
    use crate::infer::infer_schema;
    use crate::schema::{DefaultValue, LogicalType};

    fn schema(collection: &CollectionConfig) -> CollectionSchema {
        infer_schema(collection, &SqliteAdapter::new(), &FieldRegistry::default()).unwrap()
    }

    fn blog() -> CollectionConfig {
        CollectionConfig::new("blog")
            .field(FieldConfig::new("title", "text"))
            .brick(BrickConfig::new("hero").field(FieldConfig::new("image", "media")))
    }

    #[test]
    fn test_diff_with_itself_is_empty() {
        let a = schema(&blog());
        let diff = diff_schemas(&a, &a);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_diff_is_order_independent() {
        let a = schema(&blog());
        let mut shuffled = a.clone();
        shuffled.tables.reverse();
        for table in &mut shuffled.tables {
            table.columns.reverse();
        }
        assert!(diff_schemas(&a, &shuffled).is_empty());
    }

    #[test]
    fn test_empty_comparison_creates_everything_in_order() {
        let a = schema(&blog());
        let diff = diff_schemas(&a, &CollectionSchema::new("blog"));
        let created: Vec<&str> = diff.plan.created_tables().collect();
        assert_eq!(created, a.table_names().collect::<Vec<_>>());
        assert_eq!(diff.plan.collection_key, "blog");
    }

    #[test]
    fn test_added_field_yields_single_add_columns() {
        let before = schema(&blog());
        let after = schema(&blog().field(FieldConfig::new("summary", "textarea")));

        let diff = diff_schemas(&after, &before);
        assert_eq!(diff.plan.tables.len(), 1);
        let TableOperation::AddColumns { table, columns } = &diff.plan.tables[0] else {
            panic!("expected AddColumns, got {:?}", diff.plan.tables[0]);
        };
        assert_eq!(table, "strata__document__blog__fields");
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "_summary");
    }

    #[test]
    fn test_removed_field_is_reported_inactive() {
        let before = schema(&blog().field(FieldConfig::new("summary", "textarea")));
        let after = schema(&blog());

        let diff = diff_schemas(&after, &before);
        assert!(diff.plan.is_empty());
        assert_eq!(
            diff.inactive_columns,
            vec![InactiveColumn {
                table: "strata__document__blog__fields".into(),
                column: "_summary".into(),
            }]
        );
    }

    #[test]
    fn test_removed_brick_is_reported_inactive() {
        let before = schema(&blog());
        let after = schema(&CollectionConfig::new("blog").field(FieldConfig::new("title", "text")));

        let diff = diff_schemas(&after, &before);
        assert!(diff.plan.is_empty());
        assert_eq!(diff.inactive_tables, vec!["strata__document__blog__hero"]);
    }

    #[test]
    fn test_changed_attributes_only() {
        let target = schema(&blog());
        let mut live = target.clone();
        let column = live.tables[2]
            .columns
            .iter_mut()
            .find(|c| c.name == "_title")
            .unwrap();
        column.logical_type = LogicalType::Json;
        column.default = Some(DefaultValue::Text("x".into()));

        let diff = diff_schemas(&target, &live);
        let TableOperation::ModifyColumns { changes, .. } = &diff.plan.tables[0] else {
            panic!("expected ModifyColumns");
        };
        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.column, "_title");
        assert_eq!(
            change.logical_type,
            Some(Change {
                from: LogicalType::Json,
                to: LogicalType::Text
            })
        );
        assert_eq!(
            change.default,
            Some(Change {
                from: Some(DefaultValue::Text("x".into())),
                to: None
            })
        );
        assert!(change.nullable.is_none());
        assert!(change.unique.is_none());
        assert!(change.foreign_key.is_none());
    }

    #[test]
    fn test_inactive_collections() {
        let live = [
            "strata__document__blog",
            "strata__document__page__fields",
            "strata__document__page",
            "strata__migration_snapshots",
            "users",
        ];
        let inactive = inactive_collections(["blog"], live);
        assert_eq!(
            inactive,
            vec![InactiveCollection {
                key: "page".into(),
                tables: vec![
                    "strata__document__page".into(),
                    "strata__document__page__fields".into(),
                ],
            }]
        );
    }
}
