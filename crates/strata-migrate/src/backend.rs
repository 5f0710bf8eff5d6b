//! Database backend selection.
//!
//! The backend is chosen once, from the connection URL scheme, and fixes the
//! dialect adapter and introspector for the lifetime of the process.

use std::sync::Arc;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use strata_core::dialect::{DialectAdapter, MysqlAdapter, PostgresAdapter, SqliteAdapter};
use tracing::info;

use crate::error::{MigrateError, Result};
use crate::introspect::{LiveIntrospector, MysqlIntrospector, PostgresIntrospector, SqliteIntrospector};

/// Supported database kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    Sqlite,
    Postgres,
    Mysql,
}

impl DatabaseKind {
    /// Detects the database kind from a connection URL.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Settings`] for unsupported schemes.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            other => Err(MigrateError::Settings(format!(
                "unsupported database scheme '{other}'"
            ))),
        }
    }

    /// The dialect adapter for this kind.
    #[must_use]
    pub fn adapter(self) -> Arc<dyn DialectAdapter> {
        match self {
            Self::Sqlite => Arc::new(SqliteAdapter::new()),
            Self::Postgres => Arc::new(PostgresAdapter::new()),
            Self::Mysql => Arc::new(MysqlAdapter::new()),
        }
    }

    /// The live schema introspector for this kind.
    #[must_use]
    pub fn introspector(self, pool: AnyPool) -> Arc<dyn LiveIntrospector> {
        match self {
            Self::Sqlite => Arc::new(SqliteIntrospector::new(pool)),
            Self::Postgres => Arc::new(PostgresIntrospector::new(pool)),
            Self::Mysql => Arc::new(MysqlIntrospector::new(pool)),
        }
    }
}

/// A connection pool together with its dialect and introspector.
#[derive(Clone)]
pub struct Backend {
    pub kind: DatabaseKind,
    pub pool: AnyPool,
    pub adapter: Arc<dyn DialectAdapter>,
    pub introspector: Arc<dyn LiveIntrospector>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("kind", &self.kind)
            .field("adapter", &self.adapter.name())
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// Connects to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error for unsupported schemes or failed connections.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let kind = DatabaseKind::from_url(url)?;
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(backend = ?kind, "Connected to database");
        Ok(Self::from_pool(kind, pool))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(kind: DatabaseKind, pool: AnyPool) -> Self {
        Self {
            kind,
            adapter: kind.adapter(),
            introspector: kind.introspector(pool.clone()),
            pool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_url() {
        assert_eq!(DatabaseKind::from_url("sqlite::memory:").unwrap(), DatabaseKind::Sqlite);
        assert_eq!(DatabaseKind::from_url("sqlite:db.sqlite3").unwrap(), DatabaseKind::Sqlite);
        assert_eq!(
            DatabaseKind::from_url("postgres://localhost/strata").unwrap(),
            DatabaseKind::Postgres
        );
        assert_eq!(DatabaseKind::from_url("mysql://root@localhost/strata").unwrap(), DatabaseKind::Mysql);
        assert!(matches!(
            DatabaseKind::from_url("mssql://x"),
            Err(MigrateError::Settings(_))
        ));
    }

    #[test]
    fn test_adapter_matches_kind() {
        assert_eq!(DatabaseKind::Sqlite.adapter().name(), "sqlite");
        assert_eq!(DatabaseKind::Postgres.adapter().name(), "postgresql");
        assert!(!DatabaseKind::Mysql.adapter().supports_transactional_ddl());
    }
}
