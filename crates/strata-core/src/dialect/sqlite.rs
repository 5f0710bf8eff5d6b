//! SQLite adapter.

use super::{parse_common_default, parse_length, DialectAdapter};
use crate::schema::{CollectionSchemaColumn, DefaultValue, LogicalType};

/// SQLite adapter.
///
/// SQLite has no boolean storage class: booleans are stored as `INTEGER`
/// with `0`/`1` defaults, and [`resolve_type`](DialectAdapter::resolve_type)
/// reports them as integers so inferred and introspected schemas agree.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteAdapter;

impl SqliteAdapter {
    /// Creates a new SQLite adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DialectAdapter for SqliteAdapter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn resolve_type(&self, logical_type: &LogicalType) -> LogicalType {
        match logical_type {
            LogicalType::Boolean => LogicalType::Integer,
            LogicalType::LongText => LogicalType::Text,
            other => other.clone(),
        }
    }

    fn column_type(&self, logical_type: &LogicalType) -> String {
        match logical_type {
            LogicalType::Text | LogicalType::LongText => "TEXT".to_string(),
            LogicalType::Integer | LogicalType::Boolean => "INTEGER".to_string(),
            LogicalType::Json => "JSON".to_string(),
            LogicalType::Timestamp => "TIMESTAMP".to_string(),
            LogicalType::Char(n) => format!("CHAR({n})"),
            LogicalType::Custom(raw) => raw.clone(),
        }
    }

    fn parse_column_type(&self, raw: &str) -> LogicalType {
        if let Some(n) = parse_length(raw, "CHAR") {
            return LogicalType::Char(n);
        }
        match raw.trim().to_ascii_uppercase().as_str() {
            "TEXT" | "VARCHAR" | "CLOB" => LogicalType::Text,
            "INTEGER" | "INT" | "BIGINT" => LogicalType::Integer,
            "BOOLEAN" | "BOOL" => LogicalType::Boolean,
            "JSON" => LogicalType::Json,
            "TIMESTAMP" | "DATETIME" => LogicalType::Timestamp,
            _ => LogicalType::Custom(raw.to_string()),
        }
    }

    fn boolean_default(&self, value: bool) -> DefaultValue {
        DefaultValue::Integer(i64::from(value))
    }

    fn render_default(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Now => "CURRENT_TIMESTAMP".to_string(),
            DefaultValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            DefaultValue::Integer(n) => n.to_string(),
            DefaultValue::Text(s) => self.quote_literal(s),
        }
    }

    fn parse_default(&self, raw: &str, _logical_type: &LogicalType) -> Option<DefaultValue> {
        let raw = raw.trim();
        let raw = raw
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(raw);
        if let Some(parsed) = parse_common_default(raw) {
            return parsed;
        }
        if let Ok(n) = raw.parse::<i64>() {
            return Some(DefaultValue::Integer(n));
        }
        match raw.to_ascii_uppercase().as_str() {
            "TRUE" => Some(DefaultValue::Integer(1)),
            "FALSE" => Some(DefaultValue::Integer(0)),
            _ => Some(DefaultValue::Text(raw.to_string())),
        }
    }

    fn primary_key_definition(&self, column: &CollectionSchemaColumn) -> String {
        format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            self.quote_identifier(&column.name)
        )
    }

    fn max_identifier_length(&self) -> usize {
        usize::MAX
    }

    /// `ALTER TABLE ... ADD COLUMN` cannot declare `UNIQUE`, and rejects a
    /// `CURRENT_TIMESTAMP` default once the table has rows (or any default on
    /// a column with `REFERENCES`). Uniqueness becomes a unique index. Such
    /// a default is dropped from the column and written into existing rows
    /// instead; the diff keeps reporting it as a pending column change.
    fn add_column(&self, table: &str, column: &CollectionSchemaColumn) -> Vec<String> {
        let deferred_default = column
            .default
            .as_ref()
            .filter(|d| matches!(d, DefaultValue::Now) || column.foreign_key.is_some());

        let mut added = column.clone().unique(false);
        if deferred_default.is_some() {
            added = added.default_value(None).nullable(true);
        }

        let quoted_table = self.quote_identifier(table);
        let quoted_column = self.quote_identifier(&column.name);
        let mut statements = vec![format!(
            "ALTER TABLE {quoted_table} ADD COLUMN {}",
            self.column_definition(&added)
        )];
        if let Some(default) = deferred_default {
            statements.push(format!(
                "UPDATE {quoted_table} SET {quoted_column} = {}",
                self.render_default(default)
            ));
        }
        if column.unique {
            statements.push(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {quoted_table} ({quoted_column})",
                self.quote_identifier(&unique_index_name(table, &column.name))
            ));
        }
        statements
    }
}

/// Name of the index carrying a column's uniqueness.
fn unique_index_name(table: &str, column: &str) -> String {
    format!("{table}__{}__unique", column.trim_start_matches('_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booleans_stored_as_integers() {
        let adapter = SqliteAdapter::new();
        assert_eq!(adapter.resolve_type(&LogicalType::Boolean), LogicalType::Integer);
        assert_eq!(adapter.boolean_default(true), DefaultValue::Integer(1));
        assert_eq!(
            adapter.zero_default(&LogicalType::Boolean),
            Some(DefaultValue::Integer(0))
        );
    }

    #[test]
    fn test_column_types_round_trip() {
        let adapter = SqliteAdapter::new();
        for logical in [
            LogicalType::Text,
            LogicalType::Integer,
            LogicalType::Json,
            LogicalType::Timestamp,
            LogicalType::Char(36),
        ] {
            let rendered = adapter.column_type(&logical);
            assert_eq!(adapter.parse_column_type(&rendered), logical);
        }
        assert_eq!(
            adapter.parse_column_type("BLOB"),
            LogicalType::Custom("BLOB".into())
        );
    }

    #[test]
    fn test_defaults_round_trip() {
        let adapter = SqliteAdapter::new();
        for default in [
            DefaultValue::Now,
            DefaultValue::Integer(0),
            DefaultValue::Integer(-4),
            DefaultValue::Text("draft".into()),
            DefaultValue::Text("it's".into()),
        ] {
            let rendered = adapter.render_default(&default);
            assert_eq!(
                adapter.parse_default(&rendered, &LogicalType::Text),
                Some(default)
            );
        }
        assert_eq!(adapter.parse_default("NULL", &LogicalType::Text), None);
    }

    #[test]
    fn test_add_unique_column_uses_index() {
        let adapter = SqliteAdapter::new();
        let column = CollectionSchemaColumn::new("_slug", LogicalType::Text).unique(true);
        assert_eq!(
            adapter.add_column("t", &column),
            vec![
                "ALTER TABLE \"t\" ADD COLUMN \"_slug\" TEXT",
                "CREATE UNIQUE INDEX IF NOT EXISTS \"t__slug__unique\" ON \"t\" (\"_slug\")",
            ]
        );
    }

    #[test]
    fn test_add_timestamp_column_backfills_default() {
        let adapter = SqliteAdapter::new();
        let column = CollectionSchemaColumn::new("_published_at", LogicalType::Timestamp)
            .not_null()
            .default_value(Some(DefaultValue::Now));
        assert_eq!(
            adapter.add_column("t", &column),
            vec![
                "ALTER TABLE \"t\" ADD COLUMN \"_published_at\" TIMESTAMP",
                "UPDATE \"t\" SET \"_published_at\" = CURRENT_TIMESTAMP",
            ]
        );

        // Constant defaults are declared in place.
        let column = CollectionSchemaColumn::new("_views", LogicalType::Integer)
            .not_null()
            .default_value(Some(DefaultValue::Integer(0)));
        assert_eq!(
            adapter.add_column("t", &column),
            vec!["ALTER TABLE \"t\" ADD COLUMN \"_views\" INTEGER NOT NULL DEFAULT 0"]
        );
    }

    #[test]
    fn test_primary_key() {
        let column = CollectionSchemaColumn::new("id", LogicalType::Integer).primary();
        assert_eq!(
            SqliteAdapter::new().column_definition(&column),
            "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"
        );
    }
}
