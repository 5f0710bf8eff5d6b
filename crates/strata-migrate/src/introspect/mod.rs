//! Live schema introspection.
//!
//! An introspector reads every table of the connected database once and
//! returns a [`LiveSchema`]. Column types and defaults are classified by the
//! backend's dialect adapter so the result is directly comparable with an
//! inferred target schema.

mod mysql;
mod postgres;
mod sqlite;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use strata_core::naming;
use strata_core::schema::{
    CollectionSchema, CollectionSchemaColumn, CollectionSchemaTable, ColumnSource, ForeignKey,
    ForeignKeyAction,
};

pub use mysql::MysqlIntrospector;
pub use postgres::PostgresIntrospector;
pub use sqlite::SqliteIntrospector;

use crate::error::Result;

/// Reads the physical schema of a live database.
#[async_trait]
pub trait LiveIntrospector: Send + Sync {
    /// Reads every table with its columns, defaults, foreign keys and
    /// single-column unique constraints.
    async fn introspect(&self) -> Result<LiveSchema>;
}

/// A table as found in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTable {
    pub name: String,
    pub columns: Vec<CollectionSchemaColumn>,
}

/// Every table of the database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSchema {
    pub tables: Vec<LiveTable>,
}

impl LiveSchema {
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Live tables belonging to one collection, as a comparable schema.
    ///
    /// Tables whose names the namer did not produce are skipped.
    #[must_use]
    pub fn collection_schema(&self, collection: &str) -> CollectionSchema {
        let tables = self
            .tables
            .iter()
            .filter(|t| naming::collection_of(&t.name) == Some(collection))
            .filter_map(|t| {
                let (table_type, key) = naming::parse_table_name(&t.name)?;
                Some(CollectionSchemaTable {
                    name: t.name.clone(),
                    table_type,
                    key,
                    columns: t.columns.clone(),
                })
            })
            .collect();

        CollectionSchema {
            key: collection.to_string(),
            tables,
        }
    }
}

/// A column row read from a catalog, already classified by the adapter.
#[derive(Debug, Clone)]
pub(crate) struct ColumnRow {
    pub table: String,
    pub column: CollectionSchemaColumn,
}

/// A foreign key row read from a catalog.
#[derive(Debug, Clone)]
pub(crate) struct ForeignKeyRow {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_delete: String,
    pub on_update: String,
}

/// Assembles catalog rows into a [`LiveSchema`].
///
/// Column rows must arrive in ordinal order; tables keep first-seen order.
#[derive(Debug, Default)]
pub(crate) struct LiveSchemaBuilder {
    order: Vec<String>,
    columns: BTreeMap<String, Vec<CollectionSchemaColumn>>,
    foreign_keys: Vec<ForeignKeyRow>,
    unique: BTreeSet<(String, String)>,
}

impl LiveSchemaBuilder {
    pub fn table(&mut self, name: &str) {
        if !self.columns.contains_key(name) {
            self.order.push(name.to_string());
            self.columns.insert(name.to_string(), Vec::new());
        }
    }

    pub fn column(&mut self, row: ColumnRow) {
        self.table(&row.table);
        if let Some(columns) = self.columns.get_mut(&row.table) {
            columns.push(row.column);
        }
    }

    pub fn foreign_key(&mut self, row: ForeignKeyRow) {
        self.foreign_keys.push(row);
    }

    pub fn unique(&mut self, table: &str, column: &str) {
        self.unique.insert((table.to_string(), column.to_string()));
    }

    pub fn build(mut self) -> LiveSchema {
        for fk in self.foreign_keys {
            let column = self
                .columns
                .get_mut(&fk.table)
                .and_then(|cols| cols.iter_mut().find(|c| c.name == fk.column));
            if let Some(column) = column {
                column.foreign_key = Some(
                    ForeignKey::new(fk.referenced_table, fk.referenced_column)
                        .on_delete(ForeignKeyAction::from_sql(&fk.on_delete))
                        .on_update(ForeignKeyAction::from_sql(&fk.on_update)),
                );
            }
        }

        for (table, column) in &self.unique {
            if let Some(column) = self
                .columns
                .get_mut(table)
                .and_then(|cols| cols.iter_mut().find(|c| &c.name == column))
            {
                column.unique = true;
            }
        }

        let tables = self
            .order
            .into_iter()
            .map(|name| {
                let columns = self.columns.remove(&name).unwrap_or_default();
                LiveTable { name, columns }
            })
            .collect();
        LiveSchema { tables }
    }
}

/// Field columns carry the field prefix; everything else is core.
pub(crate) fn column_source(name: &str) -> ColumnSource {
    if name.starts_with(strata_core::infer::FIELD_COLUMN_PREFIX) {
        ColumnSource::Field
    } else {
        ColumnSource::Core
    }
}
