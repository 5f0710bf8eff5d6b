//! Applies a migration plan to an in-memory schema.
//!
//! This is the schema the database will have once the plan ran, used to
//! preview dry runs and to check that a diff followed by its application
//! converges.

use crate::error::{Result, SchemaError};
use crate::plan::{MigrationPlan, TableOperation};
use crate::schema::CollectionSchema;

/// Returns `schema` with every operation of `plan` applied.
///
/// `CreateTable` on an existing table and `AddColumns` of an existing column
/// are no-ops, mirroring `IF NOT EXISTS` semantics. `ModifyColumns` sets the
/// `to` side of every change.
///
/// # Errors
///
/// Returns [`SchemaError::UnknownTable`] if an operation targets a table that
/// neither exists nor is created earlier in the plan, or a column that does
/// not exist.
pub fn apply_plan(schema: &CollectionSchema, plan: &MigrationPlan) -> Result<CollectionSchema> {
    let mut result = schema.clone();

    for operation in &plan.tables {
        match operation {
            TableOperation::CreateTable { table } => {
                if result.table(&table.name).is_none() {
                    result.tables.push(table.clone());
                }
            }
            TableOperation::AddColumns { table, columns } => {
                let existing = result
                    .tables
                    .iter_mut()
                    .find(|t| &t.name == table)
                    .ok_or_else(|| SchemaError::UnknownTable(table.clone()))?;
                for column in columns {
                    if existing.column(&column.name).is_none() {
                        existing.columns.push(column.clone());
                    }
                }
            }
            TableOperation::ModifyColumns { table, changes } => {
                let existing = result
                    .tables
                    .iter_mut()
                    .find(|t| &t.name == table)
                    .ok_or_else(|| SchemaError::UnknownTable(table.clone()))?;
                for change in changes {
                    let column = existing
                        .columns
                        .iter_mut()
                        .find(|c| c.name == change.column)
                        .ok_or_else(|| SchemaError::UnknownTable(format!("{table}.{}", change.column)))?;
                    if let Some(c) = &change.logical_type {
                        column.logical_type = c.to.clone();
                    }
                    if let Some(c) = &change.nullable {
                        column.nullable = c.to;
                    }
                    if let Some(c) = &change.default {
                        column.default.clone_from(&c.to);
                    }
                    if let Some(c) = &change.foreign_key {
                        column.foreign_key.clone_from(&c.to);
                    }
                    if let Some(c) = &change.unique {
                        column.unique = c.to;
                    }
                }
            }
        }
    }

    Ok(result)
}

/// Applies only the operations the executor runs, skipping column
/// modifications.
///
/// # Errors
///
/// See [`apply_plan`].
pub fn apply_executable(schema: &CollectionSchema, plan: &MigrationPlan) -> Result<CollectionSchema> {
    let executable = MigrationPlan {
        collection_key: plan.collection_key.clone(),
        tables: plan
            .tables
            .iter()
            .filter(|op| op.is_executable())
            .cloned()
            .collect(),
    };
    apply_plan(schema, &executable)
}
