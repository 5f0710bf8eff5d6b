//! Wiring of the backend, stores, cache and resolver from [`Settings`].

use std::sync::Arc;

use strata_core::fields::FieldRegistry;
use tracing::debug;

use crate::backend::Backend;
use crate::cache::SchemaCache;
use crate::error::Result;
use crate::executor::MigrationExecutor;
use crate::kv::{DatabaseKvStore, KeyValueStore, MemoryKvStore};
use crate::migrator::Migrator;
use crate::resolver::SchemaResolver;
use crate::settings::{KvBackend, Settings};
use crate::snapshot::{SnapshotStore, SqlSnapshotStore};

/// A fully wired schema engine.
pub struct Engine {
    pub backend: Backend,
    pub resolver: Arc<SchemaResolver>,
}

impl Engine {
    /// Connects to the configured database and wires every component.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the snapshot or
    /// key-value table cannot be created.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let backend =
            Backend::connect(&settings.database.url, settings.database.max_connections).await?;
        Self::from_backend(backend, settings, FieldRegistry::default()).await
    }

    /// Wires every component over an existing backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot or key-value table cannot be created.
    pub async fn from_backend(
        backend: Backend,
        settings: &Settings,
        registry: FieldRegistry,
    ) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> = match settings.cache.backend {
            KvBackend::Memory => Arc::new(MemoryKvStore::new()),
            KvBackend::Database => {
                let store = DatabaseKvStore::new(backend.pool.clone(), Arc::clone(&backend.adapter));
                store.ensure_table().await?;
                Arc::new(store)
            }
        };
        debug!(cache = ?settings.cache.backend, "Configured schema cache");

        let snapshots = SqlSnapshotStore::new(backend.pool.clone(), Arc::clone(&backend.adapter));
        snapshots.ensure_table().await?;
        let snapshots = Arc::new(snapshots);
        let resolver = SchemaResolver::new(
            Arc::new(settings.content()),
            Arc::clone(&backend.adapter),
            Arc::clone(&backend.introspector),
            snapshots,
            SchemaCache::new(kv),
        )
        .with_registry(Arc::new(registry));

        Ok(Self {
            backend,
            resolver: Arc::new(resolver),
        })
    }

    /// A migrator sharing this engine's resolver and cache.
    #[must_use]
    pub fn migrator(&self, dry_run: bool) -> Migrator {
        let executor =
            MigrationExecutor::new(self.backend.pool.clone(), Arc::clone(&self.backend.adapter))
                .dry_run(dry_run);
        Migrator::new(Arc::clone(&self.resolver), executor)
    }

    /// Renders the statements the next migration would run.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails.
    pub async fn preview(&self) -> Result<Vec<(String, Vec<String>)>> {
        let dry_run = self.resolver.dry_run().await?;
        let executor =
            MigrationExecutor::new(self.backend.pool.clone(), Arc::clone(&self.backend.adapter));
        Ok(dry_run
            .collections
            .iter()
            .map(|c| (c.key.clone(), executor.sql_for(&c.diff.plan)))
            .collect())
    }
}
