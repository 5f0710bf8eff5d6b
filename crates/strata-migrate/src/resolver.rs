//! Runtime schema resolution.
//!
//! The resolver serves two paths:
//!
//! - The migration path ([`SchemaResolver::dry_run`]) infers every configured
//!   collection, introspects the live database once, and diffs the two.
//! - The request path ([`SchemaResolver::runtime_schema`]) compares the
//!   inferred target with the latest migration snapshot in memory and hides
//!   whatever has not been migrated yet. It never touches the live schema.

use std::sync::Arc;

use strata_core::config::ContentConfig;
use strata_core::dialect::DialectAdapter;
use strata_core::diff::{diff_schemas, inactive_collections, CollectionDiff, InactiveCollection};
use strata_core::fields::FieldRegistry;
use strata_core::infer::SchemaInference;
use strata_core::runtime::RuntimeSchema;
use strata_core::schema::CollectionSchema;
use strata_core::SchemaError;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::SchemaCache;
use crate::error::{MigrateError, Result};
use crate::introspect::LiveIntrospector;
use crate::snapshot::SnapshotStore;

/// The plan for one collection.
#[derive(Debug, Clone)]
pub struct CollectionPlan {
    pub key: String,
    pub target: CollectionSchema,
    pub diff: CollectionDiff,
}

/// A collection whose configuration could not be turned into a schema.
#[derive(Debug, Clone)]
pub struct CollectionFailure {
    pub key: String,
    pub error: SchemaError,
}

/// Result of planning every configured collection against the live schema.
#[derive(Debug, Clone, Default)]
pub struct DryRun {
    pub collections: Vec<CollectionPlan>,
    /// Collections with tables in the database but no configuration.
    pub inactive: Vec<InactiveCollection>,
    pub failures: Vec<CollectionFailure>,
}

impl DryRun {
    #[must_use]
    pub fn collection(&self, key: &str) -> Option<&CollectionPlan> {
        self.collections.iter().find(|c| c.key == key)
    }

    #[must_use]
    pub fn failure(&self, key: &str) -> Option<&CollectionFailure> {
        self.failures.iter().find(|f| f.key == key)
    }

    /// Returns `true` if any collection has operations to apply or report.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.collections.iter().any(|c| !c.diff.plan.is_empty())
    }
}

/// Outcome of [`SchemaResolver::warm`].
#[derive(Debug, Default)]
pub struct WarmReport {
    pub warmed: Vec<String>,
    pub failed: Vec<(String, MigrateError)>,
}

/// Resolves target, planned and runtime schemas for configured collections.
pub struct SchemaResolver {
    content: Arc<ContentConfig>,
    registry: Arc<FieldRegistry>,
    adapter: Arc<dyn DialectAdapter>,
    introspector: Arc<dyn LiveIntrospector>,
    snapshots: Arc<dyn SnapshotStore>,
    cache: SchemaCache<Arc<RuntimeSchema>>,
    dry_run: Mutex<Option<Arc<DryRun>>>,
}

impl SchemaResolver {
    /// Creates a resolver using the built-in field types.
    pub fn new(
        content: Arc<ContentConfig>,
        adapter: Arc<dyn DialectAdapter>,
        introspector: Arc<dyn LiveIntrospector>,
        snapshots: Arc<dyn SnapshotStore>,
        cache: SchemaCache<Arc<RuntimeSchema>>,
    ) -> Self {
        Self {
            content,
            registry: Arc::new(FieldRegistry::default()),
            adapter,
            introspector,
            snapshots,
            cache,
            dry_run: Mutex::new(None),
        }
    }

    /// Replaces the field registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<FieldRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn content(&self) -> &ContentConfig {
        &self.content
    }

    #[must_use]
    pub fn adapter(&self) -> &dyn DialectAdapter {
        self.adapter.as_ref()
    }

    #[must_use]
    pub fn snapshots(&self) -> &Arc<dyn SnapshotStore> {
        &self.snapshots
    }

    #[must_use]
    pub const fn cache(&self) -> &SchemaCache<Arc<RuntimeSchema>> {
        &self.cache
    }

    /// Infers the target schema of one collection.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::UnknownCollection`] for unconfigured keys, or
    /// the inference error.
    pub fn infer(&self, key: &str) -> Result<CollectionSchema> {
        let collection = self
            .content
            .collection(key)
            .ok_or_else(|| MigrateError::UnknownCollection(key.to_string()))?;
        Ok(SchemaInference::new(self.adapter.as_ref(), &self.registry).infer(collection)?)
    }

    // ================================================================
    // Migration path
    // ================================================================

    /// Plans every configured collection against the live schema.
    ///
    /// The result is memoized until [`invalidate`](Self::invalidate).
    /// Configuration errors are recorded per collection.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Introspection`] if the live schema cannot be
    /// read.
    pub async fn dry_run(&self) -> Result<Arc<DryRun>> {
        let mut memo = self.dry_run.lock().await;
        if let Some(dry_run) = memo.as_ref() {
            return Ok(Arc::clone(dry_run));
        }

        let live = self
            .introspector
            .introspect()
            .await
            .map_err(|e| MigrateError::Introspection(e.to_string()))?;

        let mut plan = DryRun::default();
        let inference = SchemaInference::new(self.adapter.as_ref(), &self.registry);
        for (key, result) in inference.infer_all(&self.content) {
            match result {
                Ok(target) => {
                    let diff = diff_schemas(&target, &live.collection_schema(&key));
                    debug!(
                        collection = %key,
                        operations = diff.plan.tables.len(),
                        inactive_columns = diff.inactive_columns.len(),
                        "Planned collection"
                    );
                    plan.collections.push(CollectionPlan { key, target, diff });
                }
                Err(error) => {
                    warn!(collection = %key, error = %error, "Invalid collection configuration");
                    plan.failures.push(CollectionFailure { key, error });
                }
            }
        }
        plan.inactive = inactive_collections(self.content.keys(), live.table_names());

        info!(
            collections = plan.collections.len(),
            failures = plan.failures.len(),
            inactive = plan.inactive.len(),
            "Dry run complete"
        );

        let plan = Arc::new(plan);
        *memo = Some(Arc::clone(&plan));
        Ok(plan)
    }

    /// Drops the memoized dry run.
    pub async fn invalidate(&self) {
        *self.dry_run.lock().await = None;
    }

    /// Drops the memoized dry run and every cached runtime schema.
    pub async fn invalidate_all(&self) {
        self.invalidate().await;
        self.cache.clear().await;
    }

    // ================================================================
    // Request path
    // ================================================================

    /// The schema of `key` as it exists after the latest migration.
    ///
    /// Tables and columns configured since then are omitted and listed in
    /// [`RuntimeSchema::pending`].
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::UnknownCollection`] for unconfigured keys and
    /// [`MigrateError::MigrationRequired`] if the collection was never
    /// migrated.
    pub async fn runtime_schema(&self, key: &str) -> Result<Arc<RuntimeSchema>> {
        self.resolve_runtime(key, None).await
    }

    /// Serves `key` from the cache, computing it from `target` (or a fresh
    /// inference) and the latest snapshot on a miss.
    async fn resolve_runtime(
        &self,
        key: &str,
        target: Option<CollectionSchema>,
    ) -> Result<Arc<RuntimeSchema>> {
        let collection = self
            .content
            .collection(key)
            .ok_or_else(|| MigrateError::UnknownCollection(key.to_string()))?
            .clone();

        let adapter = Arc::clone(&self.adapter);
        let registry = Arc::clone(&self.registry);
        let snapshots = Arc::clone(&self.snapshots);

        self.cache
            .resolve(key, move || async move {
                let target = match target {
                    Some(target) => target,
                    None => SchemaInference::new(adapter.as_ref(), &registry).infer(&collection)?,
                };
                let snapshot = snapshots.latest(&collection.key).await?.ok_or_else(|| {
                    MigrateError::MigrationRequired {
                        collection: collection.key.clone(),
                    }
                })?;

                let runtime = RuntimeSchema::resolve(&target, &snapshot.schema);
                if runtime.is_pending() {
                    warn!(
                        collection = %collection.key,
                        missing_tables = runtime.pending.missing_tables.len(),
                        missing_columns = runtime.pending.missing_columns.len(),
                        "Configuration is ahead of the last migration"
                    );
                }
                Ok::<_, MigrateError>(Arc::new(runtime))
            })
            .await
    }

    /// Resolves every configured collection into the cache, reusing the
    /// targets of the dry run.
    ///
    /// # Errors
    ///
    /// Fails only if the dry run fails; per-collection failures are
    /// reported.
    pub async fn warm(&self) -> Result<WarmReport> {
        let dry_run = self.dry_run().await?;
        for inactive in &dry_run.inactive {
            warn!(
                collection = %inactive.key,
                tables = inactive.tables.len(),
                "Inactive collection"
            );
        }

        let mut report = WarmReport::default();
        for failure in &dry_run.failures {
            warn!(collection = %failure.key, error = %failure.error, "Failed to warm schema");
            report
                .failed
                .push((failure.key.clone(), failure.error.clone().into()));
        }
        for plan in &dry_run.collections {
            match self.resolve_runtime(&plan.key, Some(plan.target.clone())).await {
                Ok(_) => report.warmed.push(plan.key.clone()),
                Err(e) => {
                    warn!(collection = %plan.key, error = %e, "Failed to warm schema");
                    report.failed.push((plan.key.clone(), e));
                }
            }
        }
        info!(
            warmed = report.warmed.len(),
            failed = report.failed.len(),
            "Schema cache warmed"
        );
        Ok(report)
    }
}
