//! Migration executor.
//!
//! This module applies a collection's [`MigrationPlan`] to the database.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use sqlx::{Any, AnyPool, Executor};
use strata_core::dialect::DialectAdapter;
use strata_core::plan::{ColumnChange, MigrationPlan, TableOperation};
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};

/// A column modification that was reported but not executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedChange {
    pub table: String,
    pub change: ColumnChange,
}

/// Outcome of applying one plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub collection_key: String,
    /// Statements in execution order.
    pub statements: Vec<String>,
    pub created_tables: Vec<String>,
    pub added_columns: usize,
    pub skipped: Vec<SkippedChange>,
    pub dry_run: bool,
}

/// Orders operations for execution.
///
/// `CreateTable` operations come first, each after every table it references
/// that the same plan creates; `AddColumns` follow and `ModifyColumns` come
/// last. Relative order is otherwise preserved.
#[must_use]
pub fn order_operations(operations: &[TableOperation]) -> Vec<&TableOperation> {
    let creates: Vec<&TableOperation> = operations
        .iter()
        .filter(|op| matches!(op, TableOperation::CreateTable { .. }))
        .collect();
    let pending_names: BTreeSet<&str> = creates.iter().map(|op| op.table_name()).collect();

    let mut ordered: Vec<&TableOperation> = Vec::with_capacity(operations.len());
    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    let mut remaining = creates;

    while !remaining.is_empty() {
        let before = remaining.len();
        let mut deferred = Vec::new();
        for op in remaining {
            let TableOperation::CreateTable { table } = op else {
                continue;
            };
            let ready = table
                .referenced_tables()
                .all(|r| !pending_names.contains(r) || emitted.contains(r));
            if ready {
                emitted.insert(&table.name);
                ordered.push(op);
            } else {
                deferred.push(op);
            }
        }
        if deferred.len() == before {
            // Cycle: keep declaration order for the rest.
            ordered.extend(deferred);
            break;
        }
        remaining = deferred;
    }

    ordered.extend(
        operations
            .iter()
            .filter(|op| matches!(op, TableOperation::AddColumns { .. })),
    );
    ordered.extend(
        operations
            .iter()
            .filter(|op| matches!(op, TableOperation::ModifyColumns { .. })),
    );
    ordered
}

/// Executes migration plans against a database.
#[derive(Clone)]
pub struct MigrationExecutor {
    pool: AnyPool,
    adapter: Arc<dyn DialectAdapter>,
    dry_run: bool,
}

impl MigrationExecutor {
    /// Creates a new migration executor.
    pub fn new(pool: AnyPool, adapter: Arc<dyn DialectAdapter>) -> Self {
        Self {
            pool,
            adapter,
            dry_run: false,
        }
    }

    /// Enables dry-run mode (SQL is rendered but not executed).
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Returns the dialect adapter.
    #[must_use]
    pub fn adapter(&self) -> &dyn DialectAdapter {
        self.adapter.as_ref()
    }

    /// Renders the statements for a plan in execution order.
    #[must_use]
    pub fn sql_for(&self, plan: &MigrationPlan) -> Vec<String> {
        order_operations(&plan.tables)
            .into_iter()
            .flat_map(|op| self.adapter.generate_sql(op))
            .collect()
    }

    /// Applies a plan.
    ///
    /// Statements run in one transaction when the dialect supports
    /// transactional DDL, otherwise one by one. Column modifications are
    /// logged and reported as skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Statement`] for the first statement that fails.
    pub async fn apply(&self, plan: &MigrationPlan) -> Result<ExecutionReport> {
        let mut report = ExecutionReport {
            collection_key: plan.collection_key.clone(),
            dry_run: self.dry_run,
            ..ExecutionReport::default()
        };

        for op in order_operations(&plan.tables) {
            match op {
                TableOperation::CreateTable { table } => {
                    report.created_tables.push(table.name.clone());
                }
                TableOperation::AddColumns { columns, .. } => {
                    report.added_columns += columns.len();
                }
                TableOperation::ModifyColumns { table, changes } => {
                    for change in changes {
                        warn!(
                            collection = %plan.collection_key,
                            table = %table,
                            column = %change.column,
                            attributes = ?change.attributes(),
                            "Column modification detected; not applied automatically"
                        );
                        report.skipped.push(SkippedChange {
                            table: table.clone(),
                            change: change.clone(),
                        });
                    }
                }
            }
            report.statements.extend(self.adapter.generate_sql(op));
        }

        if report.statements.is_empty() {
            debug!(collection = %plan.collection_key, "Nothing to execute");
            return Ok(report);
        }

        if self.dry_run {
            for sql in &report.statements {
                debug!(sql = %sql, "Dry run");
            }
            return Ok(report);
        }

        info!(
            collection = %plan.collection_key,
            statements = report.statements.len(),
            transactional = self.adapter.supports_transactional_ddl(),
            "Applying migration plan"
        );

        if self.adapter.supports_transactional_ddl() {
            let mut tx = self.pool.begin().await?;
            for sql in &report.statements {
                execute(&mut *tx, sql).await?;
            }
            tx.commit().await?;
        } else {
            for sql in &report.statements {
                execute(&self.pool, sql).await?;
            }
        }

        Ok(report)
    }
}

async fn execute<'e, E>(executor: E, sql: &str) -> Result<()>
where
    E: Executor<'e, Database = Any>,
{
    debug!(sql = %sql, "Executing SQL");
    executor
        .execute(sql)
        .await
        .map_err(|source| MigrateError::Statement {
            statement: sql.to_string(),
            source: Arc::new(source),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlx::any::AnyPoolOptions;
    use strata_core::config::{BrickConfig, CollectionConfig, FieldConfig};
    use strata_core::dialect::SqliteAdapter;
    use strata_core::diff::diff_schemas;
    use strata_core::fields::FieldRegistry;
    use strata_core::infer::infer_schema;
    use strata_core::plan::Change;
    use strata_core::schema::{CollectionSchema, LogicalType};

    use super::*;

    async fn create_test_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    fn page_plan() -> MigrationPlan {
        let config = CollectionConfig::new("page")
            .field(FieldConfig::new("title", "text"))
            .brick(BrickConfig::new("hero").field(FieldConfig::repeater(
                "slides",
                vec![FieldConfig::new("caption", "text")],
            )));
        let target = infer_schema(&config, &SqliteAdapter::new(), &FieldRegistry::default()).unwrap();
        diff_schemas(&target, &CollectionSchema::new("page")).plan
    }

    async fn table_names(pool: &AnyPool) -> Vec<String> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'strata%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .unwrap();
        rows.into_iter().map(|(n,)| n).collect()
    }

    #[test]
    fn test_order_puts_referenced_tables_first() {
        let mut plan = page_plan();
        plan.tables.reverse();

        let ordered = order_operations(&plan.tables);
        let position = |name: &str| ordered.iter().position(|op| op.table_name() == name).unwrap();
        assert!(position("strata__document__page") < position("strata__document__page__versions"));
        assert!(position("strata__document__page__versions") < position("strata__document__page__hero"));
        assert!(position("strata__document__page__hero") < position("strata__document__page__hero__slides"));
    }

    #[test]
    fn test_order_places_modifications_last() {
        let ops = vec![
            TableOperation::ModifyColumns {
                table: "a".into(),
                changes: Vec::new(),
            },
            TableOperation::AddColumns {
                table: "a".into(),
                columns: Vec::new(),
            },
        ];
        let ordered = order_operations(&ops);
        assert!(matches!(ordered[0], TableOperation::AddColumns { .. }));
        assert!(matches!(ordered[1], TableOperation::ModifyColumns { .. }));
    }

    #[tokio::test]
    async fn test_apply_creates_tables() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool.clone(), Arc::new(SqliteAdapter::new()));

        let report = executor.apply(&page_plan()).await.unwrap();
        assert_eq!(report.created_tables.len(), 5);
        assert!(!report.dry_run);
        assert_eq!(table_names(&pool).await.len(), 5);

        // Re-applying is harmless thanks to IF NOT EXISTS.
        executor.apply(&page_plan()).await.unwrap();
        assert_eq!(table_names(&pool).await.len(), 5);
    }

    #[tokio::test]
    async fn test_dry_run_executes_nothing() {
        let pool = create_test_pool().await;
        let executor =
            MigrationExecutor::new(pool.clone(), Arc::new(SqliteAdapter::new())).dry_run(true);

        let report = executor.apply(&page_plan()).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.statements.len(), 5);
        assert!(table_names(&pool).await.is_empty());
    }

    #[tokio::test]
    async fn test_modifications_are_skipped() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool, Arc::new(SqliteAdapter::new()));
        let plan = MigrationPlan {
            collection_key: "page".into(),
            tables: vec![TableOperation::ModifyColumns {
                table: "strata__document__page__fields".into(),
                changes: vec![ColumnChange {
                    logical_type: Change::between(LogicalType::Text, LogicalType::Integer),
                    ..ColumnChange::new("_title")
                }],
            }],
        };

        let report = executor.apply(&plan).await.unwrap();
        assert!(report.statements.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].change.column, "_title");
    }

    #[tokio::test]
    async fn test_failed_statement_is_named_and_rolled_back() {
        let pool = create_test_pool().await;
        let executor = MigrationExecutor::new(pool.clone(), Arc::new(SqliteAdapter::new()));
        let mut plan = page_plan();
        plan.tables.push(TableOperation::AddColumns {
            table: "does_not_exist".into(),
            columns: vec![strata_core::schema::CollectionSchemaColumn::new(
                "_x",
                LogicalType::Text,
            )],
        });

        let err = executor.apply(&plan).await.unwrap_err();
        let MigrateError::Statement { statement, .. } = err else {
            panic!("expected a statement error, got {err:?}");
        };
        assert!(statement.contains("does_not_exist"));
        assert!(table_names(&pool).await.is_empty());
    }
}
