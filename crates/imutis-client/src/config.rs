//! # Client Configuration
//!
//! Configuration for the gateway, durable storage, cache lifetimes and the
//! location sampler.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     IMUTIS_API_URL=https://staging.ai-imutis.com                       │
//! │     IMUTIS_RETRY_ATTEMPTS=5                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/mobile/client.toml (Linux)                               │
//! │     ~/Library/Application Support/com.imutis.mobile/client.toml        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     https://api.ai-imutis.com, 10 s timeout, 3 attempts                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # client.toml
//! [api]
//! base_url = "https://api.ai-imutis.com"
//! timeout_secs = 10
//! retry_attempts = 3
//!
//! [app]
//! version = "1.0.0"
//!
//! [storage]
//! database_path = "/data/imutis.db"
//!
//! [cache]
//! cities_ttl_secs = 86400
//!
//! [location]
//! update_interval_secs = 10
//! minimum_distance_m = 10.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use imutis_core::{cache_ttl, storage_keys, MovementThresholds};

use crate::error::{ClientError, ClientResult};

/// Default backend when nothing else is configured.
pub const DEFAULT_API_URL: &str = "https://api.ai-imutis.com";

// =============================================================================
// API Settings
// =============================================================================

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL every request path is joined onto.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds). A timed-out call is a connectivity
    /// failure.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Attempts used by callers that opt into `retry_request`.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

fn default_base_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            retry_attempts: default_retry_attempts(),
        }
    }
}

// =============================================================================
// App Settings
// =============================================================================

/// Application metadata sent with every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Reported in `X-App-Version` when the platform can't supply one.
    #[serde(default = "default_app_version")]
    pub version: String,
}

fn default_app_version() -> String {
    "1.0.0".to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            version: default_app_version(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Durable storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to `imutis.db` in the platform data dir.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Lifetimes for cached reference data (seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_attractions_ttl")]
    pub attractions_ttl_secs: u64,

    #[serde(default = "default_cities_ttl")]
    pub cities_ttl_secs: u64,

    #[serde(default = "default_trips_ttl")]
    pub trips_ttl_secs: u64,

    #[serde(default = "default_user_profile_ttl")]
    pub user_profile_ttl_secs: u64,
}

fn default_attractions_ttl() -> u64 {
    cache_ttl::ATTRACTIONS.as_secs()
}
fn default_cities_ttl() -> u64 {
    cache_ttl::CITIES.as_secs()
}
fn default_trips_ttl() -> u64 {
    cache_ttl::TRIPS.as_secs()
}
fn default_user_profile_ttl() -> u64 {
    cache_ttl::USER_PROFILE.as_secs()
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            attractions_ttl_secs: default_attractions_ttl(),
            cities_ttl_secs: default_cities_ttl(),
            trips_ttl_secs: default_trips_ttl(),
            user_profile_ttl_secs: default_user_profile_ttl(),
        }
    }
}

impl CacheSettings {
    pub fn attractions_ttl(&self) -> Duration {
        Duration::from_secs(self.attractions_ttl_secs)
    }

    pub fn cities_ttl(&self) -> Duration {
        Duration::from_secs(self.cities_ttl_secs)
    }

    pub fn trips_ttl(&self) -> Duration {
        Duration::from_secs(self.trips_ttl_secs)
    }

    pub fn user_profile_ttl(&self) -> Duration {
        Duration::from_secs(self.user_profile_ttl_secs)
    }

    /// Configured lifetime for `resource`.
    pub fn ttl_for(&self, resource: CachedResource) -> Duration {
        match resource {
            CachedResource::Attractions => self.attractions_ttl(),
            CachedResource::Cities => self.cities_ttl(),
            CachedResource::Trips => self.trips_ttl(),
            CachedResource::UserProfile => self.user_profile_ttl(),
        }
    }
}

/// Reference data served through the read-through cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedResource {
    Attractions,
    Cities,
    Trips,
    UserProfile,
}

impl CachedResource {
    pub fn storage_key(&self) -> &'static str {
        match self {
            CachedResource::Attractions => storage_keys::CACHED_ATTRACTIONS,
            CachedResource::Cities => storage_keys::CACHED_CITIES,
            CachedResource::Trips => storage_keys::CACHED_TRIPS,
            CachedResource::UserProfile => storage_keys::USER_PROFILE,
        }
    }
}

// =============================================================================
// Location Settings
// =============================================================================

/// Location sampler settings.
///
/// ## Throttling
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  A watched position becomes a sample only when BOTH hold:              │
/// │                                                                         │
/// │    elapsed since last sample  >= update_interval_secs                  │
/// │    distance from last sample  >= minimum_distance_m                    │
/// │                                                                         │
/// │  The first position after watch() starts always becomes a sample.     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSettings {
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    #[serde(default = "default_minimum_distance")]
    pub minimum_distance_m: f64,

    /// Desired horizontal accuracy for one-shot fixes (meters).
    #[serde(default = "default_accuracy_threshold")]
    pub accuracy_threshold_m: f64,

    /// How long a one-shot fix may take before it counts as unavailable.
    #[serde(default = "default_fix_timeout")]
    pub fix_timeout_secs: u64,
}

fn default_update_interval() -> u64 {
    10
}
fn default_minimum_distance() -> f64 {
    10.0
}
fn default_accuracy_threshold() -> f64 {
    20.0
}
fn default_fix_timeout() -> u64 {
    5
}

impl Default for LocationSettings {
    fn default() -> Self {
        LocationSettings {
            update_interval_secs: default_update_interval(),
            minimum_distance_m: default_minimum_distance(),
            accuracy_threshold_m: default_accuracy_threshold(),
            fix_timeout_secs: default_fix_timeout(),
        }
    }
}

impl LocationSettings {
    /// Thresholds for the watch-mode movement filter.
    pub fn thresholds(&self) -> MovementThresholds {
        MovementThresholds {
            min_interval: Duration::from_secs(self.update_interval_secs),
            min_distance_m: self.minimum_distance_m,
        }
    }

    pub fn fix_timeout(&self) -> Duration {
        Duration::from_secs(self.fix_timeout_secs)
    }
}

// =============================================================================
// Main Client Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub app: AppSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub location: LocationSettings,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (client.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ClientResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading client config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load client config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file as pretty TOML.
    pub fn save(&self, config_path: Option<PathBuf>) -> ClientResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ClientError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Client config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        let url = url::Url::parse(&self.api.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ClientError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(ClientError::InvalidConfig(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.api.retry_attempts == 0 {
            return Err(ClientError::InvalidConfig(
                "retry_attempts must be greater than 0".into(),
            ));
        }

        imutis_core::validation::validate_min_distance(self.location.minimum_distance_m)?;

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("IMUTIS_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Ok(timeout) = std::env::var("IMUTIS_API_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(t) => self.api.timeout_secs = t,
                Err(_) => warn!(value = %timeout, "Ignoring non-numeric IMUTIS_API_TIMEOUT_SECS"),
            }
        }

        if let Ok(attempts) = std::env::var("IMUTIS_RETRY_ATTEMPTS") {
            if let Ok(a) = attempts.parse::<u32>() {
                self.api.retry_attempts = a;
            }
        }

        if let Ok(version) = std::env::var("IMUTIS_APP_VERSION") {
            self.app.version = version;
        }

        if let Ok(path) = std::env::var("IMUTIS_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Ok(interval) = std::env::var("IMUTIS_LOCATION_INTERVAL_SECS") {
            if let Ok(i) = interval.parse::<u64>() {
                self.location.update_interval_secs = i;
            }
        }

        if let Ok(distance) = std::env::var("IMUTIS_LOCATION_MIN_DISTANCE_M") {
            if let Ok(d) = distance.parse::<f64>() {
                self.location.minimum_distance_m = d;
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "imutis", "mobile")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("client.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Returns the configured database path, or the platform default.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage.database_path.clone().or_else(|| {
            Self::project_dirs().map(|dirs| dirs.data_dir().join("imutis.db"))
        })
    }
}
