//! # Device Identity
//!
//! Derives a stable fingerprint for this installation once, persists it, and
//! pairs it with a freshly resolved network address on every call.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       get_identity()                                    │
//! │                                                                         │
//! │  storage[DEVICE_INFO]                                                  │
//! │       │                                                                 │
//! │       ├── present ──► reuse persisted DeviceIdentity                   │
//! │       │                                                                 │
//! │       └── absent ───► platform.describe()                              │
//! │                          │                                              │
//! │                          ▼                                              │
//! │                   brand-model-os-version-name (whitespace → _)         │
//! │                          │                                              │
//! │                          ▼                                              │
//! │                   persist (without address)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  probe.ip_address()  ── failure ──► "unknown"                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ResolvedIdentity { identity, current_address }                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use imutis_core::validation::normalize_fingerprint;
use imutis_core::{storage_keys, DeviceIdentity, DeviceKind, NetworkState, ResolvedIdentity, UNKNOWN};
use imutis_store::Storage;

use crate::error::ClientResult;

// =============================================================================
// Platform Boundary
// =============================================================================

/// Raw device attributes reported by the host platform.
///
/// Any attribute may be missing; missing attributes become `unknown`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub brand: Option<String>,
    pub model_name: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub device_name: Option<String>,
    pub is_tablet: bool,
    pub app_version: Option<String>,
}

/// Describes the device the client runs on.
#[async_trait]
pub trait DevicePlatform: Send + Sync {
    async fn describe(&self) -> ClientResult<PlatformInfo>;
}

/// A fixed description, for hosts that know their attributes up front.
#[async_trait]
impl DevicePlatform for PlatformInfo {
    async fn describe(&self) -> ClientResult<PlatformInfo> {
        Ok(self.clone())
    }
}

/// Reports the device's current network address and connectivity.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn ip_address(&self) -> ClientResult<Option<String>>;

    async fn network_state(&self) -> ClientResult<NetworkState>;
}

// =============================================================================
// Identity Service
// =============================================================================

/// Owns the persisted device identity.
#[derive(Clone)]
pub struct DeviceIdentityService {
    storage: Storage,
    platform: Arc<dyn DevicePlatform>,
    probe: Arc<dyn NetworkProbe>,
    default_app_version: String,
}

impl std::fmt::Debug for DeviceIdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentityService")
            .field("default_app_version", &self.default_app_version)
            .finish_non_exhaustive()
    }
}

impl DeviceIdentityService {
    pub fn new(
        storage: Storage,
        platform: Arc<dyn DevicePlatform>,
        probe: Arc<dyn NetworkProbe>,
        default_app_version: impl Into<String>,
    ) -> Self {
        DeviceIdentityService {
            storage,
            platform,
            probe,
            default_app_version: default_app_version.into(),
        }
    }

    /// Returns the persisted identity plus the current network address.
    ///
    /// The first call derives and persists the identity. Fails only when the
    /// platform can't describe the device and nothing is persisted yet.
    pub async fn get_identity(&self) -> ClientResult<ResolvedIdentity> {
        let identity = match self.storage.get::<DeviceIdentity>(storage_keys::DEVICE_INFO).await {
            Some(identity) => identity,
            None => {
                let identity = self.derive_identity().await?;
                self.storage.set(storage_keys::DEVICE_INFO, &identity).await;
                info!(
                    device_id = %identity.id,
                    kind = %identity.kind,
                    "Device identity created"
                );
                identity
            }
        };

        let address = self.current_address().await;
        Ok(ResolvedIdentity::new(identity, Some(address)))
    }

    /// Deletes the persisted identity. The next `get_identity` derives it
    /// again.
    pub async fn reset_identity(&self) {
        self.storage.remove(storage_keys::DEVICE_INFO).await;
        info!("Device identity reset");
    }

    /// Current IP address, or `unknown` if it can't be resolved.
    pub async fn current_address(&self) -> String {
        match self.probe.ip_address().await {
            Ok(Some(ip)) if !ip.trim().is_empty() => ip,
            Ok(_) => UNKNOWN.to_string(),
            Err(e) => {
                warn!(error = %e, "Failed to resolve device address");
                UNKNOWN.to_string()
            }
        }
    }

    /// Current connectivity. Reports disconnected when the probe fails.
    pub async fn network_state(&self) -> NetworkState {
        match self.probe.network_state().await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Failed to query network state");
                NetworkState::offline()
            }
        }
    }

    async fn derive_identity(&self) -> ClientResult<DeviceIdentity> {
        let info = self.platform.describe().await?;
        debug!(?info, "Deriving device identity");

        let id = normalize_fingerprint(&[
            info.brand.as_deref(),
            info.model_name.as_deref(),
            info.os_name.as_deref(),
            info.os_version.as_deref(),
            info.device_name.as_deref(),
        ]);

        let or_unknown = |v: &Option<String>| {
            v.clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN.to_string())
        };

        Ok(DeviceIdentity {
            id,
            kind: DeviceKind::classify(info.os_name.as_deref().unwrap_or_default(), info.is_tablet),
            model: or_unknown(&info.model_name),
            os_name: or_unknown(&info.os_name),
            os_version: or_unknown(&info.os_version),
            app_version: info
                .app_version
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| self.default_app_version.clone()),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::test_support::{pixel_tablet, storage, ScriptedProbe};
    use imutis_core::NetworkKind;

    struct BrokenPlatform;

    #[async_trait]
    impl DevicePlatform for BrokenPlatform {
        async fn describe(&self) -> ClientResult<PlatformInfo> {
            Err(ClientError::Platform("no device module".into()))
        }
    }

    #[tokio::test]
    async fn test_identity_generated_once() {
        let storage = storage();
        let probe = Arc::new(ScriptedProbe::new(&["10.0.0.5", "10.0.0.9"]));
        let service = DeviceIdentityService::new(
            storage.clone(),
            Arc::new(pixel_tablet()),
            probe.clone(),
            "1.0.0",
        );

        let first = service.get_identity().await.unwrap();
        let second = service.get_identity().await.unwrap();

        assert_eq!(first.identity, second.identity);
        assert_eq!(first.identity.id, "Google-Pixel_Tablet-Android-14-Kitchen_Tab");
        assert_eq!(first.identity.kind, DeviceKind::AndroidTablet);
        assert_eq!(first.current_address, "10.0.0.5");
        assert_eq!(second.current_address, "10.0.0.9");

        let persisted: DeviceIdentity = storage.get(storage_keys::DEVICE_INFO).await.unwrap();
        assert_eq!(persisted, first.identity);
    }

    #[tokio::test]
    async fn test_missing_attributes_become_unknown() {
        let service = DeviceIdentityService::new(
            storage(),
            Arc::new(PlatformInfo::default()),
            Arc::new(ScriptedProbe::failing()),
            "1.0.0",
        );

        let resolved = service.get_identity().await.unwrap();
        assert_eq!(resolved.identity.id, "unknown-unknown-unknown-unknown-unknown");
        assert_eq!(resolved.identity.kind, DeviceKind::AndroidPhone);
        assert_eq!(resolved.identity.app_version, "1.0.0");
        assert_eq!(resolved.current_address, "unknown");
    }

    #[tokio::test]
    async fn test_reset_rederives_identity() {
        let storage = storage();
        let service = DeviceIdentityService::new(
            storage.clone(),
            Arc::new(pixel_tablet()),
            Arc::new(ScriptedProbe::new(&["10.0.0.5"])),
            "1.0.0",
        );

        service.get_identity().await.unwrap();
        service.reset_identity().await;
        assert!(storage
            .get::<DeviceIdentity>(storage_keys::DEVICE_INFO)
            .await
            .is_none());

        let again = service.get_identity().await.unwrap();
        assert_eq!(again.identity.id, "Google-Pixel_Tablet-Android-14-Kitchen_Tab");
    }

    #[tokio::test]
    async fn test_platform_failure_surfaces_only_without_persisted_identity() {
        let storage = storage();
        let broken = DeviceIdentityService::new(
            storage.clone(),
            Arc::new(BrokenPlatform),
            Arc::new(ScriptedProbe::new(&["10.0.0.5"])),
            "1.0.0",
        );
        assert!(matches!(broken.get_identity().await, Err(ClientError::Platform(_))));

        let healthy = DeviceIdentityService::new(
            storage.clone(),
            Arc::new(pixel_tablet()),
            Arc::new(ScriptedProbe::new(&["10.0.0.5"])),
            "1.0.0",
        );
        healthy.get_identity().await.unwrap();

        // Persisted identity no longer needs the platform
        assert!(broken.get_identity().await.is_ok());
    }

    #[tokio::test]
    async fn test_network_state_degrades_to_offline() {
        let service = DeviceIdentityService::new(
            storage(),
            Arc::new(pixel_tablet()),
            Arc::new(ScriptedProbe::failing()),
            "1.0.0",
        );

        let state = service.network_state().await;
        assert!(!state.is_online());
        assert_eq!(state.kind, NetworkKind::Unknown);
    }
}
