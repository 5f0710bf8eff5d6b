//! Schema migration and runtime schema resolution for content collections.
//!
//! `strata-migrate` connects the driver-agnostic `strata-core` to a live
//! database:
//!
//! - **Introspection** - Reads tables, columns, defaults and constraints from
//!   SQLite, PostgreSQL or MySQL
//! - **Executor** - Applies additive migration plans, in a transaction where
//!   the database allows DDL in one
//! - **Snapshots** - An append-only record of each collection's schema after
//!   every migration
//! - **Resolver** - Plans every collection against the live schema, and serves
//!   runtime schemas from the latest snapshot
//! - **Cache** - A two-tier cache that computes each schema at most once at a
//!   time
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_migrate::prelude::*;
//!
//! let settings = Settings::load("strata.toml".as_ref())?;
//! let engine = Engine::connect(&settings).await?;
//!
//! // Create or extend tables, then record snapshots.
//! engine.migrator(false).migrate(None).await?;
//!
//! // Request path: no introspection, served from cache.
//! let schema = engine.resolver.runtime_schema("page").await?;
//! for table in &schema.tables {
//!     println!("{}", table.name);
//! }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show what would change
//! strata plan
//!
//! # Apply pending changes
//! strata migrate
//!
//! # Print the runtime schema of a collection
//! strata schema page
//! ```

pub mod backend;
pub mod cache;
pub mod engine;
pub mod error;
pub mod executor;
pub mod introspect;
pub mod kv;
pub mod migrator;
pub mod resolver;
pub mod settings;
pub mod snapshot;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::{Backend, DatabaseKind};
    pub use crate::cache::{cache_key, SchemaCache};
    pub use crate::engine::Engine;
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{ExecutionReport, MigrationExecutor};
    pub use crate::introspect::{LiveIntrospector, LiveSchema};
    pub use crate::kv::{DatabaseKvStore, KeyValueStore, MemoryKvStore};
    pub use crate::migrator::{MigrationOutcome, Migrator};
    pub use crate::resolver::{DryRun, SchemaResolver, WarmReport};
    pub use crate::settings::{KvBackend, Settings};
    pub use crate::snapshot::{
        MemorySnapshotStore, MigrationSnapshot, SnapshotStore, SqlSnapshotStore,
    };
    pub use strata_core::diff::InactiveCollection;
    pub use strata_core::runtime::RuntimeSchema;
}
