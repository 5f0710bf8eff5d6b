//! MySQL introspection through `information_schema`.

use async_trait::async_trait;
use sqlx::AnyPool;
use strata_core::dialect::{DialectAdapter, MysqlAdapter};
use strata_core::schema::CollectionSchemaColumn;
use tracing::debug;

use super::{column_source, ColumnRow, ForeignKeyRow, LiveIntrospector, LiveSchema, LiveSchemaBuilder};
use crate::error::Result;

// Catalog columns are cast to CHAR: some server versions report them as
// binary strings, which the Any driver will not decode as text.
const COLUMNS_SQL: &str = "SELECT CAST(c.TABLE_NAME AS CHAR), CAST(c.COLUMN_NAME AS CHAR), \
            CAST(c.COLUMN_TYPE AS CHAR), CAST(c.IS_NULLABLE AS CHAR), \
            CAST(c.COLUMN_DEFAULT AS CHAR), CAST(c.COLUMN_KEY AS CHAR), CAST(c.EXTRA AS CHAR) \
     FROM information_schema.COLUMNS c \
     JOIN information_schema.TABLES t \
       ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME \
     WHERE c.TABLE_SCHEMA = DATABASE() AND t.TABLE_TYPE = 'BASE TABLE' \
     ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION";

const FOREIGN_KEYS_SQL: &str = "SELECT CAST(kcu.TABLE_NAME AS CHAR), CAST(kcu.COLUMN_NAME AS CHAR), \
            CAST(kcu.REFERENCED_TABLE_NAME AS CHAR), CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR), \
            CAST(rc.DELETE_RULE AS CHAR), CAST(rc.UPDATE_RULE AS CHAR) \
     FROM information_schema.KEY_COLUMN_USAGE kcu \
     JOIN information_schema.REFERENTIAL_CONSTRAINTS rc \
       ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
     WHERE kcu.TABLE_SCHEMA = DATABASE() AND kcu.REFERENCED_TABLE_NAME IS NOT NULL";

/// Introspects the selected database of a MySQL server.
#[derive(Debug, Clone)]
pub struct MysqlIntrospector {
    pool: AnyPool,
    adapter: MysqlAdapter,
}

impl MysqlIntrospector {
    #[must_use]
    pub const fn new(pool: AnyPool) -> Self {
        Self {
            pool,
            adapter: MysqlAdapter::new(),
        }
    }
}

#[async_trait]
impl LiveIntrospector for MysqlIntrospector {
    async fn introspect(&self) -> Result<LiveSchema> {
        let mut builder = LiveSchemaBuilder::default();

        #[allow(clippy::type_complexity)]
        let columns: Vec<(String, String, String, String, Option<String>, String, String)> =
            sqlx::query_as(COLUMNS_SQL).fetch_all(&self.pool).await?;
        for (table, name, column_type, is_nullable, default, key, extra) in columns {
            let logical_type = self.adapter.parse_column_type(&column_type);
            let default = default
                .as_deref()
                .and_then(|raw| self.adapter.parse_default(raw, &logical_type));

            let mut column = CollectionSchemaColumn::new(&name, logical_type)
                .source(column_source(&name))
                .nullable(is_nullable == "YES")
                .default_value(default);
            if key == "PRI" && extra.contains("auto_increment") {
                column = column.primary();
            }
            if key == "UNI" {
                builder.unique(&table, &name);
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

        let live = builder.build();
        debug!(tables = live.tables.len(), "Introspected MySQL schema");
        Ok(live)
    }
}
