//! PostgreSQL introspection through `information_schema`.

use async_trait::async_trait;
use sqlx::AnyPool;
use strata_core::dialect::{DialectAdapter, PostgresAdapter};
use strata_core::schema::CollectionSchemaColumn;
use tracing::debug;

use super::{column_source, ColumnRow, ForeignKeyRow, LiveIntrospector, LiveSchema, LiveSchemaBuilder};
use crate::error::Result;

// Everything is cast to text so the rows decode through the Any driver.
const COLUMNS_SQL: &str = "SELECT c.table_name::text, c.column_name::text, c.data_type::text, \
            c.character_maximum_length::text, c.is_nullable::text, c.column_default::text \
     FROM information_schema.columns c \
     JOIN information_schema.tables t \
       ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
     WHERE c.table_schema = current_schema() AND t.table_type = 'BASE TABLE' \
     ORDER BY c.table_name, c.ordinal_position";

const FOREIGN_KEYS_SQL: &str = "SELECT kcu.table_name::text, kcu.column_name::text, \
            ccu.table_name::text, ccu.column_name::text, \
            rc.delete_rule::text, rc.update_rule::text \
     FROM information_schema.referential_constraints rc \
     JOIN information_schema.key_column_usage kcu \
       ON kcu.constraint_schema = rc.constraint_schema AND kcu.constraint_name = rc.constraint_name \
     JOIN information_schema.constraint_column_usage ccu \
       ON ccu.constraint_schema = rc.unique_constraint_schema \
      AND ccu.constraint_name = rc.unique_constraint_name \
     WHERE kcu.table_schema = current_schema()";

const UNIQUE_SQL: &str = "SELECT tc.table_name::text, MIN(kcu.column_name::text) \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
       ON kcu.constraint_schema = tc.constraint_schema AND kcu.constraint_name = tc.constraint_name \
     WHERE tc.table_schema = current_schema() AND tc.constraint_type = 'UNIQUE' \
     GROUP BY tc.table_name, tc.constraint_name \
     HAVING COUNT(*) = 1";

/// Introspects the current schema of a PostgreSQL database.
#[derive(Debug, Clone)]
pub struct PostgresIntrospector {
    pool: AnyPool,
    adapter: PostgresAdapter,
}

impl PostgresIntrospector {
    #[must_use]
    pub const fn new(pool: AnyPool) -> Self {
        Self {
            pool,
            adapter: PostgresAdapter::new(),
        }
    }
}

#[async_trait]
impl LiveIntrospector for PostgresIntrospector {
    async fn introspect(&self) -> Result<LiveSchema> {
        let mut builder = LiveSchemaBuilder::default();

        let columns: Vec<(String, String, String, Option<String>, String, Option<String>)> =
            sqlx::query_as(COLUMNS_SQL).fetch_all(&self.pool).await?;
        for (table, name, data_type, length, is_nullable, default) in columns {
            let raw_type = match length {
                Some(length) if data_type == "character" => format!("{data_type}({length})"),
                _ => data_type,
            };
            let logical_type = self.adapter.parse_column_type(&raw_type);
            let serial = default.as_deref().is_some_and(|d| d.starts_with("nextval("));
            let default = default
                .as_deref()
                .and_then(|raw| self.adapter.parse_default(raw, &logical_type));

            let mut column = CollectionSchemaColumn::new(&name, logical_type)
                .source(column_source(&name))
                .nullable(is_nullable == "YES")
                .default_value(default);
            if serial {
                column = column.primary();
            }
            builder.column(ColumnRow { table, column });
        }

        let foreign_keys: Vec<(String, String, String, String, String, String)> =
            sqlx::query_as(FOREIGN_KEYS_SQL).fetch_all(&self.pool).await?;
        for (table, column, referenced_table, referenced_column, on_delete, on_update) in
            foreign_keys
        {
            builder.foreign_key(ForeignKeyRow {
                table,
                column,
                referenced_table,
                referenced_column,
                on_delete,
                on_update,
            });
        }

        let unique: Vec<(String, String)> =
            sqlx::query_as(UNIQUE_SQL).fetch_all(&self.pool).await?;
        for (table, column) in unique {
            builder.unique(&table, &column);
        }

        let live = builder.build();
        debug!(tables = live.tables.len(), "Introspected PostgreSQL schema");
        Ok(live)
    }
}
