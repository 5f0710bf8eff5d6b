//! The migrate command: plan, execute, snapshot.

use std::sync::Arc;

use strata_core::diff::InactiveCollection;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::executor::{ExecutionReport, MigrationExecutor};
use crate::resolver::{CollectionFailure, SchemaResolver};
use crate::snapshot::MigrationSnapshot;

/// What happened to one collection.
#[derive(Debug, Clone)]
pub struct CollectionOutcome {
    pub report: ExecutionReport,
    /// The snapshot recorded, if any.
    pub snapshot: Option<MigrationSnapshot>,
}

/// Outcome of a migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrationOutcome {
    pub collections: Vec<CollectionOutcome>,
    pub inactive: Vec<InactiveCollection>,
    pub failures: Vec<CollectionFailure>,
    pub dry_run: bool,
}

impl MigrationOutcome {
    /// Total number of statements executed (or rendered, in a dry run).
    #[must_use]
    pub fn statement_count(&self) -> usize {
        self.collections.iter().map(|c| c.report.statements.len()).sum()
    }
}

/// Applies planned changes and records snapshots.
pub struct Migrator {
    resolver: Arc<SchemaResolver>,
    executor: MigrationExecutor,
}

impl Migrator {
    pub fn new(resolver: Arc<SchemaResolver>, executor: MigrationExecutor) -> Self {
        Self { resolver, executor }
    }

    /// Migrates every configured collection, or only `only`.
    ///
    /// Each run re-plans from a fresh introspection, so running it twice is
    /// harmless. A snapshot is recorded whenever DDL was applied or the
    /// latest snapshot does not match the target. The runtime schema cache is
    /// cleared afterwards.
    ///
    /// # Errors
    ///
    /// Stops at the first introspection, statement or snapshot error.
    /// Returns [`MigrateError::UnknownCollection`] if `only` is not
    /// configured.
    pub async fn migrate(&self, only: Option<&str>) -> Result<MigrationOutcome> {
        if let Some(key) = only {
            if self.resolver.content().collection(key).is_none() {
                return Err(MigrateError::UnknownCollection(key.to_string()));
            }
        }

        let dry_run = self.executor.is_dry_run();
        let snapshots = self.resolver.snapshots();
        if !dry_run {
            snapshots.ensure_table().await?;
        }

        self.resolver.invalidate().await;
        let plan = self.resolver.dry_run().await?;

        let mut outcome = MigrationOutcome {
            dry_run,
            ..MigrationOutcome::default()
        };

        for failure in &plan.failures {
            if only.is_some_and(|k| k != failure.key) {
                continue;
            }
            if only.is_some() {
                return Err(failure.error.clone().into());
            }
            warn!(collection = %failure.key, error = %failure.error, "Skipping collection");
            outcome.failures.push(failure.clone());
        }

        for inactive in &plan.inactive {
            warn!(
                collection = %inactive.key,
                tables = ?inactive.tables,
                "Collection is no longer configured; its tables are left in place"
            );
        }
        outcome.inactive.clone_from(&plan.inactive);

        for collection in &plan.collections {
            if only.is_some_and(|k| k != collection.key) {
                continue;
            }
            for table in &collection.diff.inactive_tables {
                warn!(collection = %collection.key, table = %table, "Inactive table");
            }
            for column in &collection.diff.inactive_columns {
                warn!(
                    collection = %collection.key,
                    table = %column.table,
                    column = %column.column,
                    "Inactive column"
                );
            }

            let report = self.executor.apply(&collection.diff.plan).await?;

            let mut snapshot = None;
            if !dry_run {
                let latest = snapshots.latest(&collection.key).await?;
                let stale = !latest.is_some_and(|s| s.schema == collection.target);
                if collection.diff.plan.has_executable() || stale {
                    snapshot = Some(snapshots.insert(&collection.key, &collection.target).await?);
                }
            }

            info!(
                collection = %collection.key,
                created_tables = report.created_tables.len(),
                added_columns = report.added_columns,
                skipped = report.skipped.len(),
                snapshot = snapshot.is_some(),
                "Collection migrated"
            );
            outcome.collections.push(CollectionOutcome { report, snapshot });
        }

        if !dry_run {
            self.resolver.invalidate_all().await;
        }

        info!(
            collections = outcome.collections.len(),
            statements = outcome.statement_count(),
            dry_run,
            "Migration complete"
        );
        Ok(outcome)
    }
}
