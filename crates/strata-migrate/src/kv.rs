//! Key-value stores backing the second cache tier.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::AnyPool;
use strata_core::dialect::DialectAdapter;
use strata_core::schema::{CollectionSchemaColumn, LogicalType};
use tokio::sync::RwLock;

use crate::error::Result;

/// Name of the key-value table.
pub const KV_TABLE: &str = "strata__kv";

/// A string key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Removes every entry whose key starts with `prefix`.
    async fn clear(&self, prefix: &str) -> Result<()>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self, prefix: &str) -> Result<()> {
        self.entries.write().await.retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

/// Store persisted in the `strata__kv` table, shared across processes.
#[derive(Clone)]
pub struct DatabaseKvStore {
    pool: AnyPool,
    adapter: Arc<dyn DialectAdapter>,
}

impl DatabaseKvStore {
    pub fn new(pool: AnyPool, adapter: Arc<dyn DialectAdapter>) -> Self {
        Self { pool, adapter }
    }

    /// Creates the table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub async fn ensure_table(&self) -> Result<()> {
        let columns = [
            CollectionSchemaColumn::new("id", LogicalType::Integer).primary(),
            CollectionSchemaColumn::new("kv_key", LogicalType::Text)
                .not_null()
                .unique(true),
            CollectionSchemaColumn::new("kv_value", LogicalType::LongText).not_null(),
        ];
        let sql = self.adapter.create_table_sql(KV_TABLE, &columns);
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    fn table(&self) -> String {
        self.adapter.quote_identifier(KV_TABLE)
    }
}

#[async_trait]
impl KeyValueStore for DatabaseKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let sql = format!(
            "SELECT kv_value FROM {} WHERE kv_key = {}",
            self.table(),
            self.adapter.placeholder(1)
        );
        let row: Option<(String,)> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let delete = format!(
            "DELETE FROM {} WHERE kv_key = {}",
            self.table(),
            self.adapter.placeholder(1)
        );
        let insert = format!(
            "INSERT INTO {} (kv_key, kv_value) VALUES ({}, {})",
            self.table(),
            self.adapter.placeholder(1),
            self.adapter.placeholder(2)
        );

        let mut tx = self.pool.begin().await?;
        sqlx::query(&delete).bind(key).execute(&mut *tx).await?;
        sqlx::query(&insert)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE kv_key = {}",
            self.table(),
            self.adapter.placeholder(1)
        );
        sqlx::query(&sql).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn clear(&self, prefix: &str) -> Result<()> {
        // Prefix matched in Rust: LIKE would treat `_` in keys as a wildcard.
        let keys: Vec<(String,)> = sqlx::query_as(&format!("SELECT kv_key FROM {}", self.table()))
            .fetch_all(&self.pool)
            .await?;
        let delete = format!(
            "DELETE FROM {} WHERE kv_key = {}",
            self.table(),
            self.adapter.placeholder(1)
        );

        let mut tx = self.pool.begin().await?;
        for (key,) in keys.iter().filter(|(k,)| k.starts_with(prefix)) {
            sqlx::query(&delete).bind(key).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::any::AnyPoolOptions;
    use strata_core::dialect::SqliteAdapter;

    use super::*;

    async fn create_test_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    async fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("a:1").await.unwrap(), None);

        store.set("a:1", "one").await.unwrap();
        store.set("a:1", "uno").await.unwrap();
        store.set("a:2", "two").await.unwrap();
        store.set("b:1", "other").await.unwrap();

        assert_eq!(store.get("a:1").await.unwrap().as_deref(), Some("uno"));
        assert!(store.has("a:2").await.unwrap());

        store.delete("a:2").await.unwrap();
        assert!(!store.has("a:2").await.unwrap());

        store.clear("a:").await.unwrap();
        assert!(!store.has("a:1").await.unwrap());
        assert!(store.has("b:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(&MemoryKvStore::new()).await;
    }

    #[tokio::test]
    async fn test_database_store() {
        let store = DatabaseKvStore::new(create_test_pool().await, Arc::new(SqliteAdapter::new()));
        store.ensure_table().await.unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_database_clear_with_underscore_prefix() {
        let store = DatabaseKvStore::new(create_test_pool().await, Arc::new(SqliteAdapter::new()));
        store.ensure_table().await.unwrap();
        store.set("collection:schema:blog_post", "1").await.unwrap();
        store.set("collectionXschema:blogXpost", "2").await.unwrap();

        store.clear("collection:schema:blog_").await.unwrap();
        assert!(!store.has("collection:schema:blog_post").await.unwrap());
        assert!(store.has("collectionXschema:blogXpost").await.unwrap());
    }
}
