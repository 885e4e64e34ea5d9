//! # Client Bootstrap
//!
//! Wires the services together from a [`ClientConfig`].
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ImutisClient::connect                          │
//! │                                                                         │
//! │  1. Open SQLite at config.database_path() (migrations applied)         │
//! │  2. Storage over the kv_store table                                    │
//! │  3. TokenStore::persistent + restore()                                 │
//! │  4. DeviceIdentityService (platform + network probe)                   │
//! │  5. HttpGateway (base URL + timeout from [api])                        │
//! │  6. OfflineDrainer (one per client, so drains never overlap)           │
//! │                                                                         │
//! │  Location samplers are built on demand from the shared services.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Read-through Cache
//! ```text
//! fetch_cached(resource, path)
//!   get_cached(resource key) ── hit ──► Ok(cached)
//!        │ miss or expired
//!        ▼
//!   gateway.get_json(path) ── err ──► Err (nothing cached)
//!        │ ok
//!        ▼
//!   cache_with_ttl(resource key, [cache] TTL) ──► Ok(fresh)
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use imutis_core::SystemClock;
use imutis_store::{Database, DbConfig, Storage};

use crate::config::{CachedResource, ClientConfig};
use crate::device::{DeviceIdentityService, DevicePlatform, NetworkProbe};
use crate::error::{ClientResult, GatewayResult};
use crate::events::EventBus;
use crate::gateway::{GatewaySettings, HttpGateway};
use crate::location::{LocationSampler, PermissionGate, PositionProvider};
use crate::offline::{GatewayReplayer, OfflineDrainer};
use crate::retry::retry_request;
use crate::token::TokenStore;

/// Fully wired client services.
#[derive(Clone)]
pub struct ImutisClient {
    config: ClientConfig,
    database: Option<Arc<Database>>,
    storage: Storage,
    events: EventBus,
    identity: DeviceIdentityService,
    gateway: HttpGateway,
    drainer: OfflineDrainer,
}

impl std::fmt::Debug for ImutisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImutisClient")
            .field("base_url", &self.config.api.base_url)
            .field("durable", &self.database.is_some())
            .finish_non_exhaustive()
    }
}

impl ImutisClient {
    /// Opens durable storage and builds every service.
    ///
    /// Falls back to an in-memory database when no data directory exists.
    pub async fn connect(
        config: ClientConfig,
        platform: Arc<dyn DevicePlatform>,
        probe: Arc<dyn NetworkProbe>,
    ) -> ClientResult<Self> {
        config.validate()?;

        let db_config = match config.database_path() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                DbConfig::new(path)
            }
            None => DbConfig::in_memory(),
        };

        let database = Arc::new(Database::new(db_config).await?);
        let storage = Storage::new(Arc::new(database.kv_store()), Arc::new(SystemClock));

        let mut client = Self::with_storage(config, storage, platform, probe).await?;
        client.database = Some(database);
        Ok(client)
    }

    /// Builds every service over an existing storage.
    pub async fn with_storage(
        config: ClientConfig,
        storage: Storage,
        platform: Arc<dyn DevicePlatform>,
        probe: Arc<dyn NetworkProbe>,
    ) -> ClientResult<Self> {
        let tokens = TokenStore::persistent(storage.clone());
        let restored = tokens.restore().await;

        let events = EventBus::new();
        let identity = DeviceIdentityService::new(storage.clone(), platform, probe, config.app.version.clone());
        let gateway = HttpGateway::new(
            GatewaySettings::from(&config),
            tokens,
            Some(identity.clone()),
            events.clone(),
        )?;
        let drainer = OfflineDrainer::new(
            storage.clone(),
            identity.clone(),
            Arc::new(GatewayReplayer::new(gateway.clone())),
        );

        info!(
            base_url = %config.api.base_url,
            session_restored = restored,
            "Client ready"
        );

        Ok(ImutisClient {
            config,
            database: None,
            storage,
            events,
            identity,
            gateway,
            drainer,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn identity(&self) -> &DeviceIdentityService {
        &self.identity
    }

    pub fn gateway(&self) -> &HttpGateway {
        &self.gateway
    }

    // =========================================================================
    // On-demand Services
    // =========================================================================

    /// Location sampler using the `[location]` settings.
    pub fn location_sampler(
        &self,
        permissions: Arc<dyn PermissionGate>,
        provider: Arc<dyn PositionProvider>,
    ) -> LocationSampler {
        LocationSampler::new(
            permissions,
            provider,
            self.identity.clone(),
            self.config.location.clone(),
        )
    }

    /// The client's drainer. Clones share one in-flight lock, so drains
    /// triggered from different places run one after another.
    pub fn offline_drainer(&self) -> &OfflineDrainer {
        &self.drainer
    }

    // =========================================================================
    // Request Helpers
    // =========================================================================

    /// [`retry_request`] with `[api] retry_attempts` as the attempt budget.
    pub async fn with_retry<T, F, Fut>(&self, operation: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        retry_request(self.config.api.retry_attempts, operation).await
    }

    /// Serves `resource` from the TTL cache, fetching `path` on a miss and
    /// caching the result for the configured lifetime.
    pub async fn fetch_cached<T>(&self, resource: CachedResource, path: &str) -> GatewayResult<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let key = resource.storage_key();
        if let Some(cached) = self.storage.get_cached::<T>(key).await {
            debug!(?resource, "Cache hit");
            return Ok(cached);
        }

        let fresh: T = self.gateway.get_json(path).await?;
        let ttl = self.config.cache.ttl_for(resource);
        self.storage.cache_with_ttl(key, &fresh, ttl).await;

        debug!(?resource, ttl_secs = ttl.as_secs(), "Cache filled from backend");
        Ok(fresh)
    }

    /// Closes the database pool, if one was opened.
    pub async fn shutdown(&self) {
        if let Some(database) = &self.database {
            database.close().await;
        }
        info!("Client shut down");
    }
}
