//! Field registry: maps a field type key to its resolved column spec.
//!
//! Field types themselves are defined elsewhere; by the time they reach the
//! engine each one is either a single column ([`FieldKind::Column`]) or a
//! group that owns a child table ([`FieldKind::Group`]).

use std::collections::BTreeMap;

use crate::schema::{DefaultValue, ForeignKey, ForeignKeyAction, LogicalType};

/// Table holding media records referenced by `media` fields.
///
/// Owned by the host application, which must create it before migrating a
/// collection with `media` fields on PostgreSQL or MySQL.
pub const MEDIA_TABLE: &str = "strata__media";

/// Table holding users referenced by `user` fields. Owned by the host
/// application, like [`MEDIA_TABLE`].
pub const USERS_TABLE: &str = "strata__users";

/// Column specification contributed by a field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub logical_type: LogicalType,
    pub nullable: bool,
    /// Dialect-neutral default, translated by the adapter during inference.
    pub default: Option<DefaultValue>,
    pub unique: bool,
    pub foreign_key: Option<ForeignKey>,
}

impl FieldSpec {
    /// A nullable column with no default.
    #[must_use]
    pub const fn column(logical_type: LogicalType) -> Self {
        Self {
            logical_type,
            nullable: true,
            default: None,
            unique: false,
            foreign_key: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn references(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_key = Some(foreign_key);
        self
    }
}

/// What a field type produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// One column in the owning table.
    Column(FieldSpec),
    /// A child table holding repeated rows of nested fields.
    Group,
}

/// Registry of known field types.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    types: BTreeMap<String, FieldKind>,
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FieldRegistry {
    /// An empty registry.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    /// A registry with the built-in field types.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();

        for key in ["text", "colour", "select"] {
            registry.register(key, FieldKind::Column(FieldSpec::column(LogicalType::Text)));
        }
        for key in ["textarea", "wysiwyg"] {
            registry.register(key, FieldKind::Column(FieldSpec::column(LogicalType::LongText)));
        }
        registry.register("number", FieldKind::Column(FieldSpec::column(LogicalType::Integer)));
        registry.register(
            "checkbox",
            FieldKind::Column(
                FieldSpec::column(LogicalType::Boolean).with_default(DefaultValue::Boolean(false)),
            ),
        );
        registry.register(
            "datetime",
            FieldKind::Column(FieldSpec::column(LogicalType::Timestamp)),
        );
        for key in ["json", "link"] {
            registry.register(key, FieldKind::Column(FieldSpec::column(LogicalType::Json)));
        }
        for (key, table) in [("media", MEDIA_TABLE), ("user", USERS_TABLE)] {
            registry.register(
                key,
                FieldKind::Column(
                    FieldSpec::column(LogicalType::Integer).references(
                        ForeignKey::new(table, "id").on_delete(ForeignKeyAction::SetNull),
                    ),
                ),
            );
        }
        registry.register("repeater", FieldKind::Group);

        registry
    }

    /// Registers or replaces a field type.
    pub fn register(&mut self, key: impl Into<String>, kind: FieldKind) -> &mut Self {
        self.types.insert(key.into(), kind);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldKind> {
        self.types.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}
