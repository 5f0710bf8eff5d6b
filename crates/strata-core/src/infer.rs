//! Schema inference: configuration in, target [`CollectionSchema`] out.
//!
//! The walk is depth-first. Tables are emitted in this order: document,
//! versions, document-fields followed by its repeaters, then each brick
//! followed by its repeaters. A parent is always emitted before its children.
//! Child tables reference their parents by name through the accumulated
//! inference state, so the foreign keys always match the namer.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{CollectionConfig, ContentConfig, FieldConfig};
use crate::dialect::DialectAdapter;
use crate::error::{Result, SchemaError};
use crate::fields::{FieldKind, FieldRegistry, FieldSpec};
use crate::naming;
use crate::schema::{
    CollectionSchema, CollectionSchemaColumn, CollectionSchemaTable, ColumnSource, DefaultValue,
    ForeignKey, ForeignKeyAction, LogicalType, TableKey, TableType,
};

/// Prefix of every field column, keeping them apart from core columns.
pub const FIELD_COLUMN_PREFIX: char = '_';

/// Column name for a field key.
#[must_use]
pub fn field_column_name(field_key: &str) -> String {
    format!("{FIELD_COLUMN_PREFIX}{field_key}")
}

/// Tables and names produced so far.
#[derive(Debug, Default)]
struct InferenceState {
    tables: Vec<CollectionSchemaTable>,
    names: BTreeMap<(TableType, TableKey), String>,
}

impl InferenceState {
    fn name(&mut self, table_type: TableType, key: &TableKey) -> Result<String> {
        if let Some(name) = self.names.get(&(table_type, key.clone())) {
            return Ok(name.clone());
        }
        let name = naming::table_name(table_type, key)?;
        self.names.insert((table_type, key.clone()), name.clone());
        Ok(name)
    }
}

/// Infers target schemas for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct SchemaInference<'a> {
    adapter: &'a dyn DialectAdapter,
    registry: &'a FieldRegistry,
}

impl<'a> SchemaInference<'a> {
    #[must_use]
    pub const fn new(adapter: &'a dyn DialectAdapter, registry: &'a FieldRegistry) -> Self {
        Self { adapter, registry }
    }

    /// Infers the target schema of one collection.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] for invalid keys, unknown field types,
    /// duplicate keys, mistyped defaults and identifiers the dialect cannot
    /// hold.
    pub fn infer(&self, collection: &CollectionConfig) -> Result<CollectionSchema> {
        naming::validate_key_part(&collection.key)?;

        let mut state = InferenceState::default();
        let key = TableKey::new(&collection.key);

        let document = self.document_columns();
        self.push_table(&mut state, TableType::Document, &key, document)?;

        let versions = self.versions_columns(&mut state, &key)?;
        self.push_table(&mut state, TableType::Versions, &key, versions)?;

        self.infer_group(
            &mut state,
            &collection.key,
            TableType::DocumentFields,
            key.clone(),
            &collection.fields,
        )?;

        let mut bricks = BTreeSet::new();
        for brick in &collection.bricks {
            naming::validate_brick_key(&brick.key)?;
            if !bricks.insert(brick.key.as_str()) {
                return Err(SchemaError::DuplicateKey {
                    key: brick.key.clone(),
                    scope: format!("bricks of collection '{}'", collection.key),
                });
            }
            self.infer_group(
                &mut state,
                &collection.key,
                TableType::Brick,
                key.clone().with_brick(&brick.key),
                &brick.fields,
            )?;
        }

        Ok(CollectionSchema {
            key: collection.key.clone(),
            tables: state.tables,
        })
    }

    /// Infers every configured collection, keeping per-collection results.
    #[must_use]
    pub fn infer_all(&self, config: &ContentConfig) -> Vec<(String, Result<CollectionSchema>)> {
        config
            .collections
            .iter()
            .map(|c| (c.key.clone(), self.infer(c)))
            .collect()
    }

    fn push_table(
        &self,
        state: &mut InferenceState,
        table_type: TableType,
        key: &TableKey,
        columns: Vec<CollectionSchemaColumn>,
    ) -> Result<()> {
        let name = state.name(table_type, key)?;
        let limit = self.adapter.max_identifier_length();
        if name.len() > limit {
            return Err(SchemaError::IdentifierTooLong {
                length: name.len(),
                name,
                limit,
                dialect: self.adapter.name(),
            });
        }
        state.tables.push(CollectionSchemaTable {
            name,
            table_type,
            key: key.clone(),
            columns,
        });
        Ok(())
    }

    /// Emits a field table (document-fields, brick or repeater) and then,
    /// depth-first, one table per repeater it contains.
    fn infer_group(
        &self,
        state: &mut InferenceState,
        collection: &str,
        table_type: TableType,
        key: TableKey,
        fields: &[FieldConfig],
    ) -> Result<()> {
        let mut columns = self.field_table_columns(state, collection, table_type, &key)?;
        let mut seen = BTreeSet::new();
        let mut repeaters = Vec::new();

        for field in fields {
            naming::validate_key_part(&field.key)?;
            if !seen.insert(field.key.as_str()) {
                return Err(SchemaError::DuplicateKey {
                    key: field.key.clone(),
                    scope: format!("table '{}'", state.name(table_type, &key)?),
                });
            }
            match self.registry.get(&field.field_type) {
                None => {
                    return Err(SchemaError::UnknownFieldType {
                        collection: collection.to_string(),
                        field: field.key.clone(),
                        field_type: field.field_type.clone(),
                    })
                }
                Some(FieldKind::Group) => repeaters.push(field),
                Some(FieldKind::Column(spec)) => columns.push(self.field_column(field, spec)?),
            }
        }

        self.push_table(state, table_type, &key, columns)?;

        for repeater in repeaters {
            self.infer_group(
                state,
                collection,
                TableType::Repeater,
                key.clone().with_repeater(&repeater.key),
                &repeater.fields,
            )?;
        }
        Ok(())
    }

    fn field_column(&self, field: &FieldConfig, spec: &FieldSpec) -> Result<CollectionSchemaColumn> {
        let default = match &field.default {
            Some(value) => Some(self.convert_default(field, &spec.logical_type, value)?),
            None => spec.default.as_ref().map(|d| self.translate_default(d)),
        };
        let nullable = spec.nullable && !(field.required && default.is_some());
        let unique = spec.unique || field.unique;

        // Keyed or defaulted text stays bounded so every dialect can index it.
        let logical_type = match &spec.logical_type {
            LogicalType::LongText if unique || default.is_some() => LogicalType::Text,
            other => other.clone(),
        };

        let mut column = CollectionSchemaColumn::new(
            field_column_name(&field.key),
            self.adapter.resolve_type(&logical_type),
        )
        .source(ColumnSource::Field)
        .nullable(nullable)
        .unique(unique)
        .default_value(default);
        column.foreign_key.clone_from(&spec.foreign_key);
        Ok(column)
    }

    /// Applies the adapter's conventions to a dialect-neutral default.
    fn translate_default(&self, default: &DefaultValue) -> DefaultValue {
        match default {
            DefaultValue::Now => self.adapter.now_default(),
            DefaultValue::Boolean(b) => self.adapter.boolean_default(*b),
            other => other.clone(),
        }
    }

    fn convert_default(
        &self,
        field: &FieldConfig,
        logical_type: &LogicalType,
        value: &serde_json::Value,
    ) -> Result<DefaultValue> {
        let mismatch = || SchemaError::InvalidDefault {
            field: field.key.clone(),
            reason: format!("{value} is not a valid {logical_type} default"),
        };

        let default = match logical_type {
            LogicalType::Boolean => DefaultValue::Boolean(value.as_bool().ok_or_else(mismatch)?),
            LogicalType::Integer => DefaultValue::Integer(value.as_i64().ok_or_else(mismatch)?),
            LogicalType::Text
            | LogicalType::LongText
            | LogicalType::Char(_)
            | LogicalType::Custom(_) => {
                DefaultValue::Text(value.as_str().ok_or_else(mismatch)?.to_string())
            }
            LogicalType::Timestamp => match value.as_str().ok_or_else(mismatch)? {
                "now" => DefaultValue::Now,
                literal => DefaultValue::Text(literal.to_string()),
            },
            LogicalType::Json => DefaultValue::Text(value.to_string()),
        };
        Ok(self.translate_default(&default))
    }

    fn id_column(&self) -> CollectionSchemaColumn {
        CollectionSchemaColumn::new("id", self.adapter.resolve_type(&LogicalType::Integer)).primary()
    }

    fn column(&self, name: &str, logical_type: &LogicalType) -> CollectionSchemaColumn {
        CollectionSchemaColumn::new(name, self.adapter.resolve_type(logical_type))
    }

    fn collection_key_column(&self) -> CollectionSchemaColumn {
        self.column("collection_key", &LogicalType::Text).not_null()
    }

    fn timestamp_now(&self, name: &str) -> CollectionSchemaColumn {
        self.column(name, &LogicalType::Timestamp)
            .not_null()
            .default_value(Some(self.adapter.now_default()))
    }

    fn flag(&self, name: &str) -> CollectionSchemaColumn {
        self.column(name, &LogicalType::Boolean)
            .not_null()
            .default_value(Some(self.adapter.boolean_default(false)))
    }

    fn position(&self) -> CollectionSchemaColumn {
        let logical_type = self.adapter.resolve_type(&LogicalType::Integer);
        self.column("position", &logical_type)
            .not_null()
            .default_value(self.adapter.zero_default(&logical_type))
    }

    fn reference(
        &self,
        name: &str,
        table: String,
        on_delete: ForeignKeyAction,
    ) -> CollectionSchemaColumn {
        self.column(name, &LogicalType::Integer)
            .references(ForeignKey::new(table, "id").on_delete(on_delete))
    }

    fn document_columns(&self) -> Vec<CollectionSchemaColumn> {
        vec![
            self.id_column(),
            self.collection_key_column(),
            self.flag("is_deleted"),
            self.column("deleted_at", &LogicalType::Timestamp),
            self.column("deleted_by", &LogicalType::Integer),
            self.column("created_by", &LogicalType::Integer),
            self.column("updated_by", &LogicalType::Integer),
            self.timestamp_now("created_at"),
            self.timestamp_now("updated_at"),
        ]
    }

    fn versions_columns(
        &self,
        state: &mut InferenceState,
        key: &TableKey,
    ) -> Result<Vec<CollectionSchemaColumn>> {
        let document = state.name(TableType::Document, key)?;
        let versions = state.name(TableType::Versions, key)?;
        Ok(vec![
            self.id_column(),
            self.collection_key_column(),
            self.reference("document_id", document, ForeignKeyAction::Cascade)
                .not_null(),
            self.column("version_type", &LogicalType::Text)
                .not_null()
                .default_value(Some(DefaultValue::Text("draft".to_string()))),
            self.reference("promoted_from", versions, ForeignKeyAction::SetNull),
            self.column("created_by", &LogicalType::Integer),
            self.timestamp_now("created_at"),
            self.column("updated_by", &LogicalType::Integer),
            self.timestamp_now("updated_at"),
        ])
    }

    /// Core columns of document-fields, brick and repeater tables.
    fn field_table_columns(
        &self,
        state: &mut InferenceState,
        collection: &str,
        table_type: TableType,
        key: &TableKey,
    ) -> Result<Vec<CollectionSchemaColumn>> {
        let collection_key = TableKey::new(collection);
        let document = state.name(TableType::Document, &collection_key)?;
        let versions = state.name(TableType::Versions, &collection_key)?;

        let mut columns = vec![
            self.id_column(),
            self.collection_key_column(),
            self.reference("document_id", document, ForeignKeyAction::Cascade)
                .not_null(),
            self.reference("document_version_id", versions, ForeignKeyAction::Cascade)
                .not_null(),
            self.column("locale", &LogicalType::Text).not_null(),
        ];

        match table_type {
            TableType::Brick => {
                columns.push(self.column("brick_instance_id", &LogicalType::Text).not_null());
                columns.push(self.position());
                columns.push(self.flag("is_open"));
            }
            TableType::Repeater => {
                let root = key.root();
                let root_type = if root.brick.is_some() {
                    TableType::Brick
                } else {
                    TableType::DocumentFields
                };
                let owner = state.name(root_type, &root)?;
                columns.push(
                    self.reference("brick_id", owner, ForeignKeyAction::Cascade)
                        .not_null(),
                );
                if let Some(parent) = key.parent_repeater() {
                    let parent = state.name(TableType::Repeater, &parent)?;
                    columns.push(self.reference("parent_id", parent, ForeignKeyAction::Cascade));
                }
                columns.push(self.position());
                columns.push(self.flag("is_open"));
            }
            _ => {}
        }
        Ok(columns)
    }
}

/// Convenience wrapper around [`SchemaInference::infer`].
///
/// # Errors
///
/// See [`SchemaInference::infer`].
pub fn infer_schema(
    collection: &CollectionConfig,
    adapter: &dyn DialectAdapter,
    registry: &FieldRegistry,
) -> Result<CollectionSchema> {
    SchemaInference::new(adapter, registry).infer(collection)
}
