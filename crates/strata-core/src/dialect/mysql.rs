//! MySQL adapter.

use super::{parse_common_default, parse_length, unquote, DialectAdapter};
use crate::schema::{CollectionSchemaColumn, DefaultValue, LogicalType};

/// MySQL adapter.
///
/// MySQL commits implicitly around DDL, so statements are applied one by
/// one. InnoDB ignores inline `REFERENCES`, so foreign keys are declared as
/// table constraints. Plain text is `VARCHAR(255)` so it can carry defaults
/// and unique keys; long text is `LONGTEXT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlAdapter;

impl MysqlAdapter {
    /// Creates a new MySQL adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DialectAdapter for MysqlAdapter {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn resolve_type(&self, logical_type: &LogicalType) -> LogicalType {
        logical_type.clone()
    }

    fn column_type(&self, logical_type: &LogicalType) -> String {
        match logical_type {
            LogicalType::Text => "VARCHAR(255)".to_string(),
            LogicalType::LongText => "LONGTEXT".to_string(),
            LogicalType::Integer => "INT".to_string(),
            LogicalType::Boolean => "TINYINT(1)".to_string(),
            LogicalType::Json => "JSON".to_string(),
            LogicalType::Timestamp => "DATETIME".to_string(),
            LogicalType::Char(n) => format!("CHAR({n})"),
            LogicalType::Custom(raw) => raw.clone(),
        }
    }

    /// Expects `information_schema.columns.column_type`.
    fn parse_column_type(&self, raw: &str) -> LogicalType {
        let lower = raw.trim().to_ascii_lowercase();
        // MySQL 8.0.19+ drops the display width from column_type.
        if matches!(lower.as_str(), "tinyint(1)" | "tinyint" | "boolean" | "bool") {
            return LogicalType::Boolean;
        }
        if let Some(n) = parse_length(&lower, "char") {
            return LogicalType::Char(n);
        }
        // Strip display widths and modifiers: int(11) unsigned -> int
        let base = lower
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default();
        match base {
            "varchar" => LogicalType::Text,
            "text" | "mediumtext" | "longtext" => LogicalType::LongText,
            "int" | "integer" | "bigint" | "smallint" => LogicalType::Integer,
            "json" => LogicalType::Json,
            "datetime" | "timestamp" => LogicalType::Timestamp,
            _ => LogicalType::Custom(raw.to_string()),
        }
    }

    fn render_default(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Now => "CURRENT_TIMESTAMP".to_string(),
            DefaultValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            DefaultValue::Integer(n) => n.to_string(),
            DefaultValue::Text(s) => self.quote_literal(s),
        }
    }

    /// MySQL reports string defaults unquoted, so the column type decides
    /// how a literal is read.
    fn parse_default(&self, raw: &str, logical_type: &LogicalType) -> Option<DefaultValue> {
        let raw = raw.trim();
        if let Some(parsed) = parse_common_default(raw) {
            return parsed;
        }
        match logical_type {
            LogicalType::Boolean => match raw {
                "1" => Some(DefaultValue::Boolean(true)),
                "0" => Some(DefaultValue::Boolean(false)),
                _ => Some(DefaultValue::Text(raw.to_string())),
            },
            LogicalType::Integer => raw.parse().map_or_else(
                |_| Some(DefaultValue::Text(raw.to_string())),
                |n| Some(DefaultValue::Integer(n)),
            ),
            _ => Some(DefaultValue::Text(
                unquote(raw).unwrap_or_else(|| raw.to_string()),
            )),
        }
    }

    fn primary_key_definition(&self, column: &CollectionSchemaColumn) -> String {
        format!(
            "{} INT AUTO_INCREMENT PRIMARY KEY",
            self.quote_identifier(&column.name)
        )
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn inline_foreign_keys(&self) -> bool {
        false
    }

    fn max_identifier_length(&self) -> usize {
        64
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }
}
