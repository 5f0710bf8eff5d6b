//! Configuration errors raised while naming tables and inferring schemas.

/// Errors caused by a collection's configuration.
///
/// These are local to one collection: inference of other collections is
/// unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A field references a type key the field registry does not know.
    #[error("Unknown field type '{field_type}' for field '{field}' in collection '{collection}'")]
    UnknownFieldType {
        collection: String,
        field: String,
        field_type: String,
    },

    /// A brick table was requested without a brick key.
    #[error("Brick table for collection '{0}' requires a brick key")]
    MissingBrickKey(String),

    /// A repeater table was requested with an empty repeater path.
    #[error("Repeater table for collection '{0}' requires a non-empty repeater path")]
    EmptyRepeaterPath(String),

    /// A key part cannot be used to build an identifier.
    #[error("Invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// A key part was supplied for a table type that does not use it.
    #[error("Unexpected {part} '{value}' for a {table_type} table")]
    UnexpectedKeyPart {
        table_type: &'static str,
        part: &'static str,
        value: String,
    },

    /// The same key appears twice in one scope.
    #[error("Duplicate key '{key}' in {scope}")]
    DuplicateKey { key: String, scope: String },

    /// A configured default does not match the field's logical type.
    #[error("Invalid default for field '{field}': {reason}")]
    InvalidDefault { field: String, reason: String },

    /// A generated identifier exceeds the dialect's limit.
    #[error("Identifier '{name}' is {length} characters long; the {dialect} limit is {limit}")]
    IdentifierTooLong {
        name: String,
        length: usize,
        limit: usize,
        dialect: &'static str,
    },

    /// A plan references a table the schema does not contain.
    #[error("Table '{0}' does not exist in the schema")]
    UnknownTable(String),

    /// No collection is configured under this key.
    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
