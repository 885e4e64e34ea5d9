//! # imutis-core: Pure Domain Logic
//!
//! Types, constants and pure functions shared by the storage and network
//! layers of the Imutis client. Nothing in this crate performs I/O.
//!
//! ## Module Organization
//!
//! - [`types`] - Device identity, location samples, cache/queue envelopes
//! - [`geo`] - Haversine distance, activity classification, movement filter
//! - [`clock`] - Wall-clock abstraction (system and manual)
//! - [`validation`] - Fingerprint normalization and input checks
//! - [`error`] - Validation error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod geo;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ValidationError, ValidationResult};
pub use geo::{distance_meters, MovementFilter, MovementThresholds};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Placeholder for any device attribute or address that cannot be resolved.
pub const UNKNOWN: &str = "unknown";

/// Keys used in the durable key-value store.
pub mod storage_keys {
    pub const AUTH_TOKEN: &str = "@ai_imutis_auth_token";
    pub const USER_PROFILE: &str = "@ai_imutis_user_profile";
    pub const DEVICE_INFO: &str = "@ai_imutis_device_info";
    pub const CACHED_CITIES: &str = "@ai_imutis_cached_cities";
    pub const CACHED_ATTRACTIONS: &str = "@ai_imutis_cached_attractions";
    pub const CACHED_TRIPS: &str = "@ai_imutis_cached_trips";
    pub const OFFLINE_QUEUE: &str = "@ai_imutis_offline_queue";
}

/// Default TTLs for cached reference data.
pub mod cache_ttl {
    use std::time::Duration;

    pub const ATTRACTIONS: Duration = Duration::from_secs(60 * 60);
    pub const CITIES: Duration = Duration::from_secs(24 * 60 * 60);
    pub const TRIPS: Duration = Duration::from_secs(5 * 60);
    pub const USER_PROFILE: Duration = Duration::from_secs(60 * 60);
}

/// Display-ready messages broadcast on the error topic.
pub mod messages {
    pub const SESSION_EXPIRED: &str = "Session expired. Please login again.";
    pub const SERVER_ERROR: &str = "Server error occurred";
    pub const NETWORK_ERROR: &str = "Network connection error. Please check your internet.";
    pub const LOCATION_PERMISSION_DENIED: &str = "Location permission denied";
}

/// Outbound header names attached by the gateway.
pub mod headers {
    pub const DEVICE_ID: &str = "X-Device-ID";
    pub const DEVICE_TYPE: &str = "X-Device-Type";
    pub const DEVICE_OS: &str = "X-Device-OS";
    pub const DEVICE_IP: &str = "X-Device-IP";
    pub const APP_VERSION: &str = "X-App-Version";
}
