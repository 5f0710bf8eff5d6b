//! Dialect adapters.
//!
//! Every database-specific decision lives behind [`DialectAdapter`]: how a
//! logical type is stored, how defaults are rendered and read back, how the
//! primary key column is declared and whether DDL can run inside a
//! transaction. Inference, diffing and execution never hard-code dialect
//! syntax.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MysqlAdapter;
pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

use crate::plan::TableOperation;
use crate::schema::{CollectionSchemaColumn, CollectionSchemaTable, DefaultValue, ForeignKey, LogicalType};

/// Capability interface for one SQL dialect.
pub trait DialectAdapter: std::fmt::Debug + Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Maps a declared logical type to the type this dialect actually stores.
    ///
    /// Inference passes every type through this so that the target schema
    /// matches what introspection reads back. Dialects whose plain text type
    /// is unbounded store long text as text.
    fn resolve_type(&self, logical_type: &LogicalType) -> LogicalType {
        match logical_type {
            LogicalType::LongText => LogicalType::Text,
            other => other.clone(),
        }
    }

    /// SQL type for a logical type.
    fn column_type(&self, logical_type: &LogicalType) -> String;

    /// Classifies a column type as reported by the database catalog.
    fn parse_column_type(&self, raw: &str) -> LogicalType;

    /// Default meaning "current timestamp".
    fn now_default(&self) -> DefaultValue {
        DefaultValue::Now
    }

    /// Default for a boolean column.
    fn boolean_default(&self, value: bool) -> DefaultValue {
        DefaultValue::Boolean(value)
    }

    /// Zero value for a logical type, used for counters and flags.
    fn zero_default(&self, logical_type: &LogicalType) -> Option<DefaultValue> {
        match logical_type {
            LogicalType::Integer => Some(DefaultValue::Integer(0)),
            LogicalType::Boolean => Some(self.boolean_default(false)),
            LogicalType::Text | LogicalType::Char(_) => Some(DefaultValue::Text(String::new())),
            _ => None,
        }
    }

    /// Renders a default as a SQL expression.
    fn render_default(&self, default: &DefaultValue) -> String;

    /// Parses a default expression as reported by the database catalog.
    ///
    /// `logical_type` is the already-classified column type, which some
    /// dialects need to interpret unquoted literals.
    fn parse_default(&self, raw: &str, logical_type: &LogicalType) -> Option<DefaultValue>;

    /// Column definition for the auto-incrementing primary key.
    fn primary_key_definition(&self, column: &CollectionSchemaColumn) -> String;

    /// Whether DDL statements can run inside a transaction.
    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    /// Whether foreign keys are declared inline on the column.
    ///
    /// When `false`, they are emitted as table constraints.
    fn inline_foreign_keys(&self) -> bool {
        true
    }

    /// Longest identifier the dialect accepts.
    fn max_identifier_length(&self) -> usize;

    /// Quotes an identifier.
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Bind parameter placeholder for the 1-based `index`.
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    /// Quotes a string literal.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// `REFERENCES` clause for a foreign key.
    fn references_clause(&self, foreign_key: &ForeignKey) -> String {
        format!(
            "REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote_identifier(&foreign_key.table),
            self.quote_identifier(&foreign_key.column),
            foreign_key.on_delete.as_sql(),
            foreign_key.on_update.as_sql()
        )
    }

    /// Full column definition.
    fn column_definition(&self, column: &CollectionSchemaColumn) -> String {
        if column.primary {
            return self.primary_key_definition(column);
        }

        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.column_type(&column.logical_type)
        );
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if column.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.render_default(default));
        }
        if self.inline_foreign_keys() {
            if let Some(fk) = &column.foreign_key {
                sql.push(' ');
                sql.push_str(&self.references_clause(fk));
            }
        }
        sql
    }

    /// `CREATE TABLE IF NOT EXISTS` for an arbitrary column list.
    fn create_table_sql(&self, name: &str, columns: &[CollectionSchemaColumn]) -> String {
        let mut definitions: Vec<String> = columns
            .iter()
            .map(|c| format!("    {}", self.column_definition(c)))
            .collect();

        if !self.inline_foreign_keys() {
            for column in columns {
                if let Some(fk) = &column.foreign_key {
                    definitions.push(format!(
                        "    FOREIGN KEY ({}) {}",
                        self.quote_identifier(&column.name),
                        self.references_clause(fk)
                    ));
                }
            }
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            self.quote_identifier(name),
            definitions.join(",\n")
        )
    }

    /// `CREATE TABLE IF NOT EXISTS` for a schema table.
    fn create_table(&self, table: &CollectionSchemaTable) -> String {
        self.create_table_sql(&table.name, &table.columns)
    }

    /// Statements adding one column to an existing table.
    ///
    /// Usually a single `ALTER TABLE ... ADD COLUMN`; dialects that cannot
    /// add some constraints in place return follow-up statements.
    fn add_column(&self, table: &str, column: &CollectionSchemaColumn) -> Vec<String> {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column)
        );
        if !self.inline_foreign_keys() {
            if let Some(fk) = &column.foreign_key {
                sql.push_str(&format!(
                    ", ADD FOREIGN KEY ({}) {}",
                    self.quote_identifier(&column.name),
                    self.references_clause(fk)
                ));
            }
        }
        vec![sql]
    }

    /// Statements for one operation.
    ///
    /// Column modifications produce no statements.
    fn generate_sql(&self, operation: &TableOperation) -> Vec<String> {
        match operation {
            TableOperation::CreateTable { table } => vec![self.create_table(table)],
            TableOperation::AddColumns { table, columns } => columns
                .iter()
                .flat_map(|c| self.add_column(table, c))
                .collect(),
            TableOperation::ModifyColumns { .. } => Vec::new(),
        }
    }
}

/// Extracts `N` from `PREFIX(N)`, case-insensitively.
pub(crate) fn parse_length(raw: &str, prefix: &str) -> Option<u32> {
    let upper = raw.trim().to_ascii_uppercase();
    let inner = upper
        .strip_prefix(&prefix.to_ascii_uppercase())?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')?;
    inner.trim().parse().ok()
}

/// Strips one level of single quotes and unescapes doubled quotes.
pub(crate) fn unquote(raw: &str) -> Option<String> {
    raw.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace("''", "'"))
}

/// Shared handling of defaults that read the same on every dialect.
pub(crate) fn parse_common_default(raw: &str) -> Option<Option<DefaultValue>> {
    let trimmed = raw.trim();
    let upper = trimmed.to_ascii_uppercase();

    if upper == "NULL" {
        return Some(None);
    }
    if upper.starts_with("CURRENT_TIMESTAMP") || upper.starts_with("NOW(") {
        return Some(Some(DefaultValue::Now));
    }
    if let Some(text) = unquote(trimmed) {
        return Some(Some(DefaultValue::Text(text)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ForeignKeyAction, TableKey, TableType};

    fn sample_table() -> CollectionSchemaTable {
        CollectionSchemaTable {
            name: "strata__document__page__versions".into(),
            table_type: TableType::Versions,
            key: TableKey::new("page"),
            columns: vec![
                CollectionSchemaColumn::new("id", LogicalType::Integer).primary(),
                CollectionSchemaColumn::new("document_id", LogicalType::Integer)
                    .not_null()
                    .references(
                        ForeignKey::new("strata__document__page", "id")
                            .on_delete(ForeignKeyAction::Cascade),
                    ),
                CollectionSchemaColumn::new("version_type", LogicalType::Text)
                    .not_null()
                    .default_value(Some(DefaultValue::Text("draft".into()))),
            ],
        }
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length("CHAR(36)", "char"), Some(36));
        assert_eq!(parse_length("character (12)", "CHARACTER"), Some(12));
        assert_eq!(parse_length("CHAR", "CHAR"), None);
        assert_eq!(parse_length("VARCHAR(3)", "CHAR"), None);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("'it''s'"), Some("it's".into()));
        assert_eq!(unquote("draft"), None);
    }

    #[test]
    fn test_inline_foreign_keys() {
        let sql = SqliteAdapter::new().create_table(&sample_table());
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"strata__document__page__versions\" ("));
        assert!(sql.contains(
            "\"document_id\" INTEGER NOT NULL REFERENCES \"strata__document__page\" (\"id\") ON DELETE CASCADE ON UPDATE NO ACTION"
        ));
        assert!(!sql.contains("FOREIGN KEY"));
    }

    #[test]
    fn test_table_level_foreign_keys() {
        let sql = MysqlAdapter::new().create_table(&sample_table());
        assert!(sql.contains("`document_id` INT NOT NULL,"));
        assert!(sql.contains(
            "FOREIGN KEY (`document_id`) REFERENCES `strata__document__page` (`id`) ON DELETE CASCADE"
        ));
    }

    #[test]
    fn test_generate_sql_skips_modifications() {
        let adapter = PostgresAdapter::new();
        let op = TableOperation::ModifyColumns {
            table: "t".into(),
            changes: Vec::new(),
        };
        assert!(adapter.generate_sql(&op).is_empty());

        let op = TableOperation::AddColumns {
            table: "t".into(),
            columns: vec![
                CollectionSchemaColumn::new("_a", LogicalType::Text),
                CollectionSchemaColumn::new("_b", LogicalType::Json),
            ],
        };
        assert_eq!(
            adapter.generate_sql(&op),
            vec![
                "ALTER TABLE \"t\" ADD COLUMN \"_a\" TEXT",
                "ALTER TABLE \"t\" ADD COLUMN \"_b\" JSONB",
            ]
        );
    }
}
