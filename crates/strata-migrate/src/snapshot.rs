//! Migration snapshots.
//!
//! After each successful migration of a collection, the target schema that
//! was migrated to is appended to the `strata__migration_snapshots` table.
//! The latest snapshot is what the request path trusts to exist.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::AnyPool;
use strata_core::dialect::DialectAdapter;
use strata_core::schema::{CollectionSchema, CollectionSchemaColumn, LogicalType};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;

/// Name of the snapshots table.
pub const SNAPSHOT_TABLE: &str = "strata__migration_snapshots";

/// A persisted record of a collection's schema at migration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSnapshot {
    pub id: i64,
    pub collection_key: String,
    pub schema: CollectionSchema,
    pub created_at: DateTime<Utc>,
}

/// Append-only storage for migration snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Creates the backing storage if needed.
    async fn ensure_table(&self) -> Result<()>;

    /// Appends a snapshot and returns it.
    async fn insert(&self, collection_key: &str, schema: &CollectionSchema)
        -> Result<MigrationSnapshot>;

    /// The most recent snapshot for a collection.
    async fn latest(&self, collection_key: &str) -> Result<Option<MigrationSnapshot>>;

    /// Every snapshot for a collection, newest first.
    async fn history(&self, collection_key: &str) -> Result<Vec<MigrationSnapshot>>;
}

// ================================================================
// SQL-backed store
// ================================================================

/// Snapshot store backed by a database table.
#[derive(Clone)]
pub struct SqlSnapshotStore {
    pool: AnyPool,
    adapter: Arc<dyn DialectAdapter>,
}

impl SqlSnapshotStore {
    /// Creates a new snapshot store.
    pub fn new(pool: AnyPool, adapter: Arc<dyn DialectAdapter>) -> Self {
        Self { pool, adapter }
    }

    fn columns(&self) -> Vec<CollectionSchemaColumn> {
        vec![
            CollectionSchemaColumn::new("id", LogicalType::Integer).primary(),
            CollectionSchemaColumn::new("collection_key", LogicalType::Text).not_null(),
            CollectionSchemaColumn::new("schema_json", LogicalType::LongText).not_null(),
            CollectionSchemaColumn::new("created_at", LogicalType::Text).not_null(),
        ]
    }

    fn select_sql(&self, limit: Option<u32>) -> String {
        let mut sql = format!(
            "SELECT id, collection_key, schema_json, created_at FROM {} WHERE collection_key = {} ORDER BY id DESC",
            self.adapter.quote_identifier(SNAPSHOT_TABLE),
            self.adapter.placeholder(1)
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql
    }

    async fn fetch(&self, collection_key: &str, limit: Option<u32>) -> Result<Vec<MigrationSnapshot>> {
        let rows: Vec<(i64, String, String, String)> = sqlx::query_as(&self.select_sql(limit))
            .bind(collection_key)
            .fetch_all(&self.pool)
            .await?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for (id, collection_key, schema_json, created_at) in rows {
            snapshots.push(MigrationSnapshot {
                id,
                collection_key,
                schema: serde_json::from_str(&schema_json)?,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(snapshots)
    }
}

#[async_trait]
impl SnapshotStore for SqlSnapshotStore {
    async fn ensure_table(&self) -> Result<()> {
        let sql = self.adapter.create_table_sql(SNAPSHOT_TABLE, &self.columns());
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert(
        &self,
        collection_key: &str,
        schema: &CollectionSchema,
    ) -> Result<MigrationSnapshot> {
        let sql = format!(
            "INSERT INTO {} (collection_key, schema_json, created_at) VALUES ({}, {}, {})",
            self.adapter.quote_identifier(SNAPSHOT_TABLE),
            self.adapter.placeholder(1),
            self.adapter.placeholder(2),
            self.adapter.placeholder(3)
        );
        sqlx::query(&sql)
            .bind(collection_key)
            .bind(serde_json::to_string(schema)?)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        debug!(collection = %collection_key, "Recorded migration snapshot");

        self.fetch(collection_key, Some(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| sqlx::Error::RowNotFound.into())
    }

    async fn latest(&self, collection_key: &str) -> Result<Option<MigrationSnapshot>> {
        Ok(self.fetch(collection_key, Some(1)).await?.into_iter().next())
    }

    async fn history(&self, collection_key: &str) -> Result<Vec<MigrationSnapshot>> {
        self.fetch(collection_key, None).await
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    // SQLite datetime format fallback
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .map_err(|err| sqlx::Error::Decode(Box::new(err)).into())
}

// ================================================================
// In-memory store
// ================================================================

/// Snapshot store kept in process memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, Vec<MigrationSnapshot>>>,
    next_id: std::sync::atomic::AtomicI64,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn ensure_table(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(
        &self,
        collection_key: &str,
        schema: &CollectionSchema,
    ) -> Result<MigrationSnapshot> {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        let snapshot = MigrationSnapshot {
            id,
            collection_key: collection_key.to_string(),
            schema: schema.clone(),
            created_at: Utc::now(),
        };
        self.snapshots
            .write()
            .await
            .entry(collection_key.to_string())
            .or_default()
            .push(snapshot.clone());
        Ok(snapshot)
    }

    async fn latest(&self, collection_key: &str) -> Result<Option<MigrationSnapshot>> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(collection_key)
            .and_then(|s| s.last().cloned()))
    }

    async fn history(&self, collection_key: &str) -> Result<Vec<MigrationSnapshot>> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(collection_key)
            .map(|s| s.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::any::AnyPoolOptions;
    use strata_core::dialect::SqliteAdapter;
    use strata_core::schema::{CollectionSchemaTable, TableKey, TableType};

    use super::*;
    use crate::error::MigrateError;

    async fn create_test_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    fn schema(key: &str, columns: usize) -> CollectionSchema {
        let mut schema = CollectionSchema::new(key);
        schema.tables.push(CollectionSchemaTable {
            name: format!("strata__document__{key}"),
            table_type: TableType::Document,
            key: TableKey::new(key),
            columns: (0..columns)
                .map(|i| CollectionSchemaColumn::new(format!("c{i}"), LogicalType::Text))
                .collect(),
        });
        schema
    }

    #[tokio::test]
    async fn test_sql_store_round_trip() {
        let pool = create_test_pool().await;
        let store = SqlSnapshotStore::new(pool, Arc::new(SqliteAdapter::new()));
        store.ensure_table().await.unwrap();
        store.ensure_table().await.unwrap(); // Idempotent

        assert!(store.latest("page").await.unwrap().is_none());

        let first = store.insert("page", &schema("page", 1)).await.unwrap();
        let second = store.insert("page", &schema("page", 2)).await.unwrap();
        store.insert("post", &schema("post", 1)).await.unwrap();

        assert!(second.id > first.id);
        assert_eq!(second.schema, schema("page", 2));

        let latest = store.latest("page").await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.schema.column_count(), 2);

        let history = store.history("page").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySnapshotStore::new();
        store.insert("page", &schema("page", 1)).await.unwrap();
        store.insert("page", &schema("page", 3)).await.unwrap();

        let latest = store.latest("page").await.unwrap().unwrap();
        assert_eq!(latest.schema.column_count(), 3);
        assert_eq!(store.history("page").await.unwrap().len(), 2);
        assert!(store.history("post").await.unwrap().is_empty());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2024-03-01T10:00:00+00:00").unwrap();
        let sqlite = parse_timestamp("2024-03-01 10:00:00").unwrap();
        assert_eq!(rfc, sqlite);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[tokio::test]
    async fn test_unreadable_timestamp_is_an_error() {
        let pool = create_test_pool().await;
        let store = SqlSnapshotStore::new(pool.clone(), Arc::new(SqliteAdapter::new()));
        store.ensure_table().await.unwrap();
        store.insert("page", &schema("page", 1)).await.unwrap();

        sqlx::query("UPDATE strata__migration_snapshots SET created_at = 'not a date'")
            .execute(&pool)
            .await
            .unwrap();

        let err = store.history("page").await.unwrap_err();
        assert!(matches!(err, MigrateError::Database(_)), "got {err:?}");
        assert!(store.latest("page").await.is_err());
    }
}
