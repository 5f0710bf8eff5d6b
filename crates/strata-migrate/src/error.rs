//! Error types for migration and schema resolution.

use std::sync::Arc;

use strata_core::SchemaError;

/// Errors that can occur while migrating or resolving schemas.
///
/// The type is `Clone` so that one failed computation can be handed to every
/// caller waiting on it; foreign errors are wrapped in [`Arc`] for that.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MigrateError {
    /// Invalid collection configuration.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Database error outside of DDL execution.
    #[error("Database error: {0}")]
    Database(Arc<sqlx::Error>),

    /// A DDL statement failed.
    #[error("Failed to execute `{statement}`: {source}")]
    Statement {
        /// The statement that failed.
        statement: String,
        /// The underlying driver error.
        source: Arc<sqlx::Error>,
    },

    /// The live schema could not be read.
    #[error("Introspection failed: {0}")]
    Introspection(String),

    /// A collection has never been migrated.
    #[error("Collection '{collection}' has no migration snapshot; run `strata migrate` first")]
    MigrationRequired {
        /// The collection key.
        collection: String,
    },

    /// No collection is configured under this key.
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    /// Invalid or unreadable settings.
    #[error("Settings error: {0}")]
    Settings(String),

    /// IO error (reading settings files).
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// A background computation was cancelled or panicked.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl MigrateError {
    /// HTTP-style status code for surfacing the error to API callers.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::MigrationRequired { .. } => 400,
            Self::UnknownCollection(_) => 404,
            _ => 500,
        }
    }

    /// Returns `true` if the caller, not the system, is at fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl From<sqlx::Error> for MigrateError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(Arc::new(err))
    }
}

impl From<serde_json::Error> for MigrateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(err))
    }
}

impl From<std::io::Error> for MigrateError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<toml::de::Error> for MigrateError {
    fn from(err: toml::de::Error) -> Self {
        Self::Settings(err.to_string())
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
