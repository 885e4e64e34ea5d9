//! # Key-Value Store Boundary
//!
//! The durable store only speaks strings. Structured values are serialized
//! one layer up in [`crate::cache::Storage`].
//!
//! ## Backends
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       KeyValueStore (trait)                             │
//! │                                                                         │
//! │   get_item(key) ──► Option<String>                                     │
//! │   set_item(key, value)                                                  │
//! │   remove_item(key)                                                      │
//! │   clear()                                                               │
//! │                                                                         │
//! │        ┌────────────────────┐          ┌────────────────────┐          │
//! │        │  SqliteKvStore     │          │  MemoryKvStore     │          │
//! │        │  kv_store table    │          │  RwLock<HashMap>   │          │
//! │        │  (durable)         │          │  (process-local)   │          │
//! │        └────────────────────┘          └────────────────────┘          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreResult;

// =============================================================================
// Trait
// =============================================================================

/// String key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` when the key is absent.
    async fn get_item(&self, key: &str) -> StoreResult<Option<String>>;

    /// Inserts or replaces the value under `key`.
    async fn set_item(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove_item(&self, key: &str) -> StoreResult<()>;

    /// Removes every key.
    async fn clear(&self) -> StoreResult<()>;
}

// =============================================================================
// SQLite Backend
// =============================================================================

/// Key-value store backed by the `kv_store` table.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Creates a new SqliteKvStore over an already-migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        SqliteKvStore { pool }
    }

    /// Counts stored keys.
    pub async fn len(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_store")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        debug!(key = %key, hit = value.is_some(), "kv get");
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(key = %key, bytes = value.len(), "kv set");
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        debug!(key = %key, removed = result.rows_affected(), "kv remove");
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM kv_store").execute(&self.pool).await?;
        debug!(removed = result.rows_affected(), "kv clear");
        Ok(())
    }
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// Process-local key-value store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
