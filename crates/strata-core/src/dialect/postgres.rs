//! PostgreSQL adapter.

use super::{parse_common_default, parse_length, DialectAdapter};
use crate::schema::{CollectionSchemaColumn, DefaultValue, LogicalType};

/// PostgreSQL adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresAdapter;

impl PostgresAdapter {
    /// Creates a new PostgreSQL adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Drops a trailing `::type` cast, e.g. `'draft'::text`.
fn strip_cast(raw: &str) -> &str {
    // Casts follow the closing quote of a literal, so only look after it.
    let search_from = raw.rfind('\'').unwrap_or(0);
    match raw[search_from..].find("::") {
        Some(pos) => &raw[..search_from + pos],
        None => raw,
    }
}

impl DialectAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn column_type(&self, logical_type: &LogicalType) -> String {
        match logical_type {
            LogicalType::Text | LogicalType::LongText => "TEXT".to_string(),
            LogicalType::Integer => "INTEGER".to_string(),
            LogicalType::Boolean => "BOOLEAN".to_string(),
            LogicalType::Json => "JSONB".to_string(),
            LogicalType::Timestamp => "TIMESTAMP WITH TIME ZONE".to_string(),
            LogicalType::Char(n) => format!("CHAR({n})"),
            LogicalType::Custom(raw) => raw.clone(),
        }
    }

    /// Expects `information_schema.columns.data_type`, with the character
    /// length appended in parentheses for `character` columns.
    fn parse_column_type(&self, raw: &str) -> LogicalType {
        if let Some(n) = parse_length(raw, "CHARACTER").or_else(|| parse_length(raw, "CHAR")) {
            return LogicalType::Char(n);
        }
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "character varying" => LogicalType::Text,
            "integer" | "int" | "int4" | "bigint" | "smallint" => LogicalType::Integer,
            "boolean" | "bool" => LogicalType::Boolean,
            "json" | "jsonb" => LogicalType::Json,
            "timestamp with time zone" | "timestamptz" | "timestamp without time zone"
            | "timestamp" => LogicalType::Timestamp,
            _ => LogicalType::Custom(raw.to_string()),
        }
    }

    fn render_default(&self, default: &DefaultValue) -> String {
        match default {
            DefaultValue::Now => "NOW()".to_string(),
            DefaultValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            DefaultValue::Integer(n) => n.to_string(),
            DefaultValue::Text(s) => self.quote_literal(s),
        }
    }

    fn parse_default(&self, raw: &str, logical_type: &LogicalType) -> Option<DefaultValue> {
        let raw = raw.trim();
        if raw.starts_with("nextval(") {
            return None;
        }
        let raw = strip_cast(raw).trim();
        if let Some(parsed) = parse_common_default(raw) {
            // Negative integers are reported quoted: '-1'::integer
            if let (Some(DefaultValue::Text(text)), LogicalType::Integer) = (&parsed, logical_type) {
                if let Ok(n) = text.parse::<i64>() {
                    return Some(DefaultValue::Integer(n));
                }
            }
            return parsed;
        }
        if let Ok(n) = raw.parse::<i64>() {
            return Some(DefaultValue::Integer(n));
        }
        match raw.to_ascii_lowercase().as_str() {
            "true" => Some(DefaultValue::Boolean(true)),
            "false" => Some(DefaultValue::Boolean(false)),
            _ => Some(DefaultValue::Text(raw.to_string())),
        }
    }

    fn primary_key_definition(&self, column: &CollectionSchemaColumn) -> String {
        format!("{} SERIAL PRIMARY KEY", self.quote_identifier(&column.name))
    }

    fn max_identifier_length(&self) -> usize {
        63
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }
}
