//! # strata-core
//!
//! Driver-agnostic core of the strata schema engine.
//!
//! This crate provides:
//! - Deterministic table naming for collections, bricks and repeaters
//! - Inference of a target schema from content-model configuration
//! - A structural diff engine producing additive migration plans
//! - Dialect adapters for SQLite, PostgreSQL and MySQL
//! - The runtime view of a schema, filtered to what has been migrated
//!
//! Nothing here performs I/O; see `strata-migrate` for introspection,
//! execution and caching.
//!
//! ## Inferring and diffing
//!
//! ```rust
//! use strata_core::config::{BrickConfig, CollectionConfig, FieldConfig};
//! use strata_core::dialect::SqliteAdapter;
//! use strata_core::diff::diff_schemas;
//! use strata_core::fields::FieldRegistry;
//! use strata_core::infer::infer_schema;
//! use strata_core::schema::CollectionSchema;
//!
//! let page = CollectionConfig::new("page")
//!     .field(FieldConfig::new("title", "text"))
//!     .brick(BrickConfig::new("hero").field(FieldConfig::new("image", "media")));
//!
//! let target = infer_schema(&page, &SqliteAdapter::new(), &FieldRegistry::default()).unwrap();
//! assert_eq!(target.tables[3].name, "strata__document__page__hero");
//!
//! // Against an empty database every table is created.
//! let diff = diff_schemas(&target, &CollectionSchema::new("page"));
//! assert_eq!(diff.plan.created_tables().count(), 4);
//! ```

pub mod config;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod fields;
pub mod infer;
pub mod naming;
pub mod plan;
pub mod runtime;
pub mod schema;
pub mod state;

pub use config::{BrickConfig, CollectionConfig, ContentConfig, FieldConfig};
pub use dialect::{DialectAdapter, MysqlAdapter, PostgresAdapter, SqliteAdapter};
pub use diff::{diff_schemas, inactive_collections, CollectionDiff, InactiveCollection};
pub use error::{Result, SchemaError};
pub use fields::{FieldKind, FieldRegistry, FieldSpec};
pub use infer::{infer_schema, SchemaInference};
pub use plan::{Change, ColumnChange, MigrationPlan, TableOperation};
pub use runtime::{additive_diff, AdditiveDiff, RuntimeSchema};
pub use schema::{
    CollectionSchema, CollectionSchemaColumn, CollectionSchemaTable, ColumnSource, DefaultValue,
    ForeignKey, ForeignKeyAction, LogicalType, TableKey, TableType,
};
