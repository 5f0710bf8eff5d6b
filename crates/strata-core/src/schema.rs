//! Dialect-neutral description of the tables a collection needs.
//!
//! A [`CollectionSchema`] is produced by inference from configuration, read
//! back from the live database by an introspector, or deserialized from a
//! migration snapshot. All three share this representation so they can be
//! compared with the diff engine.

use serde::{Deserialize, Serialize};

/// Storage type of a column, independent of any SQL dialect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    Text,
    /// Text without a practical length limit (rich text, serialized payloads).
    LongText,
    Integer,
    Boolean,
    Json,
    Timestamp,
    /// Fixed-length character column.
    Char(u32),
    /// A live column type the dialect adapter could not classify.
    Custom(String),
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::LongText => f.write_str("long_text"),
            Self::Integer => f.write_str("integer"),
            Self::Boolean => f.write_str("boolean"),
            Self::Json => f.write_str("json"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::Char(n) => write!(f, "char({n})"),
            Self::Custom(raw) => write!(f, "custom({raw})"),
        }
    }
}

/// Column default, rendered to SQL only by a dialect adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// The current timestamp at insert time.
    Now,
    Boolean(bool),
    Integer(i64),
    Text(String),
}

/// Referential action for a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL keyword for this action.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parses an action as reported by a database catalog.
    ///
    /// Unknown or missing values normalize to [`ForeignKeyAction::NoAction`].
    #[must_use]
    pub fn from_sql(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "RESTRICT" => Self::Restrict,
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }
}

/// A foreign key reference from one column to `table.column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    /// References `table.column` with no referential actions.
    #[must_use]
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    #[must_use]
    pub const fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    #[must_use]
    pub const fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }
}

/// Whether a column is fixed by the system or derived from a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    #[default]
    Core,
    Field,
}

/// A single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchemaColumn {
    pub name: String,
    #[serde(default)]
    pub source: ColumnSource,
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

impl CollectionSchemaColumn {
    /// Creates a nullable core column.
    #[must_use]
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            source: ColumnSource::Core,
            logical_type,
            nullable: true,
            default: None,
            primary: false,
            unique: false,
            foreign_key: None,
        }
    }

    /// Marks the column as the auto-incrementing primary key.
    #[must_use]
    pub const fn primary(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub const fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    #[must_use]
    pub fn default_value(mut self, default: Option<DefaultValue>) -> Self {
        self.default = default;
        self
    }

    #[must_use]
    pub fn references(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_key = Some(foreign_key);
        self
    }

    #[must_use]
    pub const fn source(mut self, source: ColumnSource) -> Self {
        self.source = source;
        self
    }
}

/// The role a table plays for its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableType {
    Document,
    Versions,
    DocumentFields,
    Brick,
    Repeater,
}

impl TableType {
    /// Human readable name, used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Versions => "versions",
            Self::DocumentFields => "document-fields",
            Self::Brick => "brick",
            Self::Repeater => "repeater",
        }
    }
}

/// Logical identity of a table within a collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableKey {
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brick: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repeater_path: Vec<String>,
}

impl TableKey {
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            brick: None,
            repeater_path: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_brick(mut self, brick: impl Into<String>) -> Self {
        self.brick = Some(brick.into());
        self
    }

    /// Appends a repeater to the path.
    #[must_use]
    pub fn with_repeater(mut self, repeater: impl Into<String>) -> Self {
        self.repeater_path.push(repeater.into());
        self
    }

    /// The key of the enclosing repeater, if this key is nested at least two
    /// levels deep.
    #[must_use]
    pub fn parent_repeater(&self) -> Option<Self> {
        if self.repeater_path.len() < 2 {
            return None;
        }
        let mut parent = self.clone();
        parent.repeater_path.pop();
        Some(parent)
    }

    /// The key of the brick or document-fields table that owns this key.
    #[must_use]
    pub fn root(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            brick: self.brick.clone(),
            repeater_path: Vec::new(),
        }
    }
}

/// A single table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchemaTable {
    pub name: String,
    #[serde(rename = "type")]
    pub table_type: TableType,
    pub key: TableKey,
    pub columns: Vec<CollectionSchemaColumn>,
}

impl CollectionSchemaTable {
    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&CollectionSchemaColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Tables this table references through foreign keys, excluding itself.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref())
            .map(|fk| fk.table.as_str())
            .filter(move |t| *t != self.name)
    }
}

/// Every table of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub key: String,
    pub tables: Vec<CollectionSchemaTable>,
}

impl CollectionSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            tables: Vec::new(),
        }
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&CollectionSchemaTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Returns `true` if `table.column` exists.
    #[must_use]
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.table(table).is_some_and(|t| t.column(column).is_some())
    }

    /// Total number of columns across all tables.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_key_action_parsing() {
        assert_eq!(ForeignKeyAction::from_sql("CASCADE"), ForeignKeyAction::Cascade);
        assert_eq!(ForeignKeyAction::from_sql("set null"), ForeignKeyAction::SetNull);
        assert_eq!(ForeignKeyAction::from_sql("SET_DEFAULT"), ForeignKeyAction::SetDefault);
        assert_eq!(ForeignKeyAction::from_sql(""), ForeignKeyAction::NoAction);
        assert_eq!(ForeignKeyAction::from_sql("NO ACTION"), ForeignKeyAction::NoAction);
    }

    #[test]
    fn test_foreign_key_actions_default_when_absent() {
        let fk: ForeignKey = serde_json::from_str(r#"{"table":"a","column":"id"}"#).unwrap();
        assert_eq!(fk.on_delete, ForeignKeyAction::NoAction);
        assert_eq!(fk.on_update, ForeignKeyAction::NoAction);
    }

    #[test]
    fn test_table_key_navigation() {
        let key = TableKey::new("page")
            .with_brick("hero")
            .with_repeater("slides")
            .with_repeater("links");

        let parent = key.parent_repeater().unwrap();
        assert_eq!(parent.repeater_path, vec!["slides"]);
        assert!(parent.parent_repeater().is_none());
        assert_eq!(key.root(), TableKey::new("page").with_brick("hero"));
    }

    #[test]
    fn test_column_serialization_shape() {
        let column = CollectionSchemaColumn::new("_title", LogicalType::Char(36))
            .source(ColumnSource::Field)
            .not_null()
            .default_value(Some(DefaultValue::Text("x".into())));
        let json = serde_json::to_value(&column).unwrap();

        assert_eq!(json["type"], serde_json::json!({"char": 36}));
        assert_eq!(json["source"], "field");
        assert_eq!(json["default"], serde_json::json!({"text": "x"}));
        assert!(json.get("foreign_key").is_none());

        let back: CollectionSchemaColumn = serde_json::from_value(json).unwrap();
        assert_eq!(back, column);
    }

    #[test]
    fn test_referenced_tables_excludes_self() {
        let table = CollectionSchemaTable {
            name: "t".into(),
            table_type: TableType::Versions,
            key: TableKey::new("c"),
            columns: vec![
                CollectionSchemaColumn::new("a", LogicalType::Integer)
                    .references(ForeignKey::new("other", "id")),
                CollectionSchemaColumn::new("b", LogicalType::Integer)
                    .references(ForeignKey::new("t", "id")),
            ],
        };
        assert_eq!(table.referenced_tables().collect::<Vec<_>>(), vec!["other"]);
    }
}
