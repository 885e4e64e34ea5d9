//! # Persistent TTL Cache and Offline Queue
//!
//! Structured storage over a [`KeyValueStore`]. Values are JSON at the
//! string boundary; every failure is logged and degrades to "absent" or a
//! no-op so callers never see a storage error.
//!
//! ## Expiry
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       get_cached(key)                                   │
//! │                                                                         │
//! │  read {payload, writtenAt, ttlMs}                                      │
//! │       │                                                                 │
//! │       ├── now - writtenAt <= ttl ──► Some(payload)                     │
//! │       │                                                                 │
//! │       └── now - writtenAt >  ttl ──► remove(key), None                 │
//! │                                                                         │
//! │  No background sweep: an expired entry lives until its next read.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Offline Queue
//! One JSON array under [`storage_keys::OFFLINE_QUEUE`]. Appends are a
//! read-modify-write, so two concurrent appends can lose one of them.
//! Callers that need every action kept must funnel appends through a
//! single owner.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use imutis_core::{storage_keys, CacheEntry, Clock, OfflineAction};

use crate::kv::KeyValueStore;

/// Structured, failure-tolerant storage.
#[derive(Clone)]
pub struct Storage {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Storage { kv, clock }
    }

    /// The clock used to stamp cache entries and queued actions.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // =========================================================================
    // Plain Values
    // =========================================================================

    /// Reads and deserializes `key`. Missing, unreadable or malformed
    /// values all come back as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.kv.get_item(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                error!(key = %key, error = %e, "Storage read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Stored value is malformed");
                None
            }
        }
    }

    /// Serializes and writes `value` under `key`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                error!(key = %key, error = %e, "Failed to serialize value");
                return;
            }
        };

        if let Err(e) = self.kv.set_item(key, &raw).await {
            error!(key = %key, error = %e, "Storage write failed");
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.kv.remove_item(key).await {
            error!(key = %key, error = %e, "Storage remove failed");
        }
    }

    /// Wipes every key in the backing store.
    pub async fn clear(&self) {
        if let Err(e) = self.kv.clear().await {
            error!(error = %e, "Storage clear failed");
        }
    }

    // =========================================================================
    // TTL Cache
    // =========================================================================

    /// Stores `value` stamped with the current time and `ttl`.
    pub async fn cache_with_ttl<T: Serialize>(&self, key: &str, value: T, ttl: Duration) {
        let entry = CacheEntry::new(value, self.clock.now(), ttl);
        debug!(key = %key, ttl_ms = entry.ttl_ms, "Caching value");
        self.set(key, &entry).await;
    }

    /// Returns the cached payload while it is fresh.
    ///
    /// An entry read exactly `ttl` after it was written is still fresh.
    /// Expired entries are removed as a side effect of the read.
    pub async fn get_cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry: CacheEntry<T> = self.get(key).await?;
        let now = self.clock.now();

        if entry.is_fresh_at(now) {
            return Some(entry.payload);
        }

        debug!(
            key = %key,
            written_at = %entry.written_at,
            ttl_ms = entry.ttl_ms,
            "Cache entry expired"
        );
        self.remove(key).await;
        None
    }

    // =========================================================================
    // Offline Queue
    // =========================================================================

    /// Appends `payload` to the offline queue, stamped with the current time.
    pub async fn queue_offline_action(&self, payload: serde_json::Value) {
        let mut queue = self.get_offline_queue().await;
        queue.push(OfflineAction {
            payload,
            queued_at: self.clock.now(),
        });

        debug!(depth = queue.len(), "Queued offline action");
        self.set(storage_keys::OFFLINE_QUEUE, &queue).await;
    }

    /// Returns every queued action, oldest first. Empty when nothing is
    /// queued or the stored queue can't be read.
    pub async fn get_offline_queue(&self) -> Vec<OfflineAction> {
        self.get(storage_keys::OFFLINE_QUEUE)
            .await
            .unwrap_or_default()
    }

    pub async fn clear_offline_queue(&self) {
        self.remove(storage_keys::OFFLINE_QUEUE).await;
    }

    /// Overwrites the queue with `remaining`, removing the key when it is
    /// empty. Used after a partial drain.
    pub async fn replace_offline_queue(&self, remaining: &[OfflineAction]) {
        if remaining.is_empty() {
            self.clear_offline_queue().await;
        } else {
            self.set(storage_keys::OFFLINE_QUEUE, remaining).await;
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::kv::MemoryKvStore;
    use crate::pool::{Database, DbConfig};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use imutis_core::ManualClock;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct City {
        name: String,
        population: u32,
    }

    fn kigali() -> City {
        City {
            name: "Kigali".to_string(),
            population: 1_200_000,
        }
    }

    fn memory_storage() -> (Storage, Arc<ManualClock>, Arc<MemoryKvStore>) {
        let clock = Arc::new(ManualClock::new(
            chrono::Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        ));
        let kv = Arc::new(MemoryKvStore::new());
        let storage = Storage::new(kv.clone(), clock.clone());
        (storage, clock, kv)
    }

    /// Backend that fails every call.
    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get_item(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn set_item(&self, _key: &str, _value: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn remove_item(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
        async fn clear(&self) -> StoreResult<()> {
            Err(StoreError::Unavailable("disk gone".into()))
        }
    }

    #[tokio::test]
    async fn test_structured_values_round_trip() {
        let (storage, _, _) = memory_storage();

        storage.set("city", &kigali()).await;
        assert_eq!(storage.get::<City>("city").await, Some(kigali()));

        storage.remove("city").await;
        assert_eq!(storage.get::<City>("city").await, None);
    }

    #[tokio::test]
    async fn test_malformed_value_reads_as_absent() {
        let (storage, _, kv) = memory_storage();
        kv.set_item("city", "{not json").await.unwrap();

        assert_eq!(storage.get::<City>("city").await, None);
    }

    #[tokio::test]
    async fn test_cache_fresh_at_exact_ttl_boundary() {
        let (storage, clock, _) = memory_storage();

        storage
            .cache_with_ttl("cities", vec![kigali()], Duration::from_secs(60))
            .await;

        clock.advance(chrono::Duration::seconds(60));
        let cached: Option<Vec<City>> = storage.get_cached("cities").await;
        assert_eq!(cached, Some(vec![kigali()]));
    }

    #[tokio::test]
    async fn test_cache_expired_entry_is_evicted() {
        let (storage, clock, kv) = memory_storage();

        storage
            .cache_with_ttl("cities", vec![kigali()], Duration::from_secs(60))
            .await;

        clock.advance(chrono::Duration::milliseconds(60_001));
        let cached: Option<Vec<City>> = storage.get_cached("cities").await;
        assert_eq!(cached, None);

        // The read removed the row itself
        assert_eq!(kv.get_item("cities").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_keys_are_independent() {
        let (storage, clock, _) = memory_storage();

        storage
            .cache_with_ttl("trips", 1_u32, imutis_core::cache_ttl::TRIPS)
            .await;
        storage
            .cache_with_ttl("cities", 2_u32, imutis_core::cache_ttl::CITIES)
            .await;

        clock.advance(chrono::Duration::minutes(10));
        assert_eq!(storage.get_cached::<u32>("trips").await, None);
        assert_eq!(storage.get_cached::<u32>("cities").await, Some(2));
    }

    #[tokio::test]
    async fn test_offline_queue_preserves_order() {
        let (storage, clock, _) = memory_storage();

        storage.queue_offline_action(json!({ "op": "A" })).await;
        clock.advance(chrono::Duration::seconds(1));
        storage.queue_offline_action(json!({ "op": "B" })).await;

        let queue = storage.get_offline_queue().await;
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].payload, json!({ "op": "A" }));
        assert_eq!(queue[1].payload, json!({ "op": "B" }));
        assert!(queue[0].queued_at <= queue[1].queued_at);

        storage.clear_offline_queue().await;
        assert!(storage.get_offline_queue().await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_queue_with_empty_removes_key() {
        let (storage, _, kv) = memory_storage();

        storage.queue_offline_action(json!(1)).await;
        storage.replace_offline_queue(&[]).await;

        assert_eq!(kv.get_item(storage_keys::OFFLINE_QUEUE).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_broken_backend_degrades_silently() {
        let storage = Storage::new(Arc::new(BrokenStore), Arc::new(ManualClock::default()));

        storage.set("k", &1).await;
        assert_eq!(storage.get::<i32>("k").await, None);
        storage.cache_with_ttl("k", 1, Duration::from_secs(1)).await;
        assert_eq!(storage.get_cached::<i32>("k").await, None);
        storage.queue_offline_action(json!("x")).await;
        assert!(storage.get_offline_queue().await.is_empty());
        storage.remove("k").await;
        storage.clear().await;
    }

    #[tokio::test]
    async fn test_clear_wipes_sqlite_backend() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let storage = Storage::new(Arc::new(db.kv_store()), Arc::new(ManualClock::default()));

        storage.set("a", &1).await;
        storage.queue_offline_action(json!({ "op": "A" })).await;
        storage.clear().await;

        assert_eq!(storage.get::<i32>("a").await, None);
        assert!(storage.get_offline_queue().await.is_empty());
        assert_eq!(db.kv_store().len().await.unwrap(), 0);
    }
}
