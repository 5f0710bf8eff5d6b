//! SQLite introspection through `sqlite_master` and the pragma table
//! functions.

use async_trait::async_trait;
use sqlx::AnyPool;
use strata_core::dialect::{DialectAdapter, SqliteAdapter};
use strata_core::schema::CollectionSchemaColumn;
use tracing::debug;

use super::{column_source, ColumnRow, ForeignKeyRow, LiveIntrospector, LiveSchema, LiveSchemaBuilder};
use crate::error::Result;

const TABLES_SQL: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

const COLUMNS_SQL: &str = "SELECT name, type, \"notnull\", dflt_value, pk \
     FROM pragma_table_info(?) ORDER BY cid";

const FOREIGN_KEYS_SQL: &str = "SELECT \"from\", \"table\", \"to\", on_delete, on_update \
     FROM pragma_foreign_key_list(?)";

// Single-column UNIQUE constraints ('u') and unique indexes ('c'), which is
// how columns added later carry uniqueness. Primary keys ('pk') are excluded.
const UNIQUE_SQL: &str = "SELECT MIN(ii.name) \
     FROM pragma_index_list(?) AS il, pragma_index_info(il.name) AS ii \
     WHERE il.\"unique\" = 1 AND il.origin IN ('u', 'c') \
     GROUP BY il.name HAVING COUNT(*) = 1";

/// Introspects a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteIntrospector {
    pool: AnyPool,
    adapter: SqliteAdapter,
}

impl SqliteIntrospector {
    #[must_use]
    pub const fn new(pool: AnyPool) -> Self {
        Self {
            pool,
            adapter: SqliteAdapter::new(),
        }
    }
}

#[async_trait]
impl LiveIntrospector for SqliteIntrospector {
    async fn introspect(&self) -> Result<LiveSchema> {
        let tables: Vec<(String,)> = sqlx::query_as(TABLES_SQL).fetch_all(&self.pool).await?;
        let mut builder = LiveSchemaBuilder::default();

        for (table,) in tables {
            builder.table(&table);

            let columns: Vec<(String, String, i64, Option<String>, i64)> =
                sqlx::query_as(COLUMNS_SQL)
                    .bind(&table)
                    .fetch_all(&self.pool)
                    .await?;
            for (name, raw_type, not_null, default, pk) in columns {
                let logical_type = self.adapter.parse_column_type(&raw_type);
                let default = default
                    .as_deref()
                    .and_then(|raw| self.adapter.parse_default(raw, &logical_type));
                let mut column = CollectionSchemaColumn::new(&name, logical_type)
                    .source(column_source(&name))
                    .nullable(not_null == 0)
                    .default_value(default);
                if pk > 0 {
                    column = column.primary();
                }
                builder.column(ColumnRow {
                    table: table.clone(),
                    column,
                });
            }

            let foreign_keys: Vec<(String, String, Option<String>, String, String)> =
                sqlx::query_as(FOREIGN_KEYS_SQL)
                    .bind(&table)
                    .fetch_all(&self.pool)
                    .await?;
            for (column, referenced_table, referenced_column, on_delete, on_update) in foreign_keys {
                builder.foreign_key(ForeignKeyRow {
                    table: table.clone(),
                    column,
                    referenced_table,
                    referenced_column: referenced_column.unwrap_or_else(|| "id".to_string()),
                    on_delete,
                    on_update,
                });
            }

            let unique: Vec<(String,)> = sqlx::query_as(UNIQUE_SQL)
                .bind(&table)
                .fetch_all(&self.pool)
                .await?;
            for (column,) in unique {
                builder.unique(&table, &column);
            }
        }

        let live = builder.build();
        debug!(tables = live.tables.len(), "Introspected SQLite schema");
        Ok(live)
    }
}
