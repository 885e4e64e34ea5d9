//! # Domain Types
//!
//! Core types shared by the storage and network layers.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ DeviceIdentity  │   │ LocationSample  │   │ OfflineAction   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (finger-    │   │  subject_id     │   │  payload (JSON) │       │
//! │  │      print)     │   │  device_address │   │  queued_at      │       │
//! │  │  kind           │   │  lat / lon      │   └─────────────────┘       │
//! │  │  model, os      │   │  accuracy       │                             │
//! │  │  app_version    │   │  activity       │   ┌─────────────────┐       │
//! │  └────────┬────────┘   └─────────────────┘   │ CacheEntry<T>   │       │
//! │           │                                  │  ─────────────  │       │
//! │           ▼                                  │  payload        │       │
//! │  ┌─────────────────┐                         │  written_at     │       │
//! │  │ResolvedIdentity │  identity + fresh       │  ttl_ms         │       │
//! │  │                 │  current_address        └─────────────────┘       │
//! │  └─────────────────┘  (never persisted)                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Field names serialize in camelCase because the same JSON is read by the
//! app's TypeScript layer and stored in the key-value store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::UNKNOWN;

// =============================================================================
// Device Identity
// =============================================================================

/// Physical form of the device running the app.
///
/// Serialized with the exact strings the backend expects in `X-Device-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum DeviceKind {
    #[serde(rename = "iPhone")]
    IPhone,
    #[serde(rename = "iPad")]
    IPad,
    #[default]
    #[serde(rename = "Android Phone")]
    AndroidPhone,
    #[serde(rename = "Android Tablet")]
    AndroidTablet,
}

impl DeviceKind {
    /// Derives the kind from the OS name and whether the hardware is a tablet.
    ///
    /// Unrecognized operating systems fall back to `AndroidPhone`.
    pub fn classify(os_name: &str, is_tablet: bool) -> Self {
        match os_name {
            "iOS" | "iPadOS" if is_tablet => DeviceKind::IPad,
            "iOS" | "iPadOS" => DeviceKind::IPhone,
            "Android" if is_tablet => DeviceKind::AndroidTablet,
            _ => DeviceKind::AndroidPhone,
        }
    }

    /// Header value sent as `X-Device-Type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::IPhone => "iPhone",
            DeviceKind::IPad => "iPad",
            DeviceKind::AndroidPhone => "Android Phone",
            DeviceKind::AndroidTablet => "Android Tablet",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of one app installation.
///
/// Created once per install and persisted. Only a full reset replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    /// Derived fingerprint, see [`crate::validation::normalize_fingerprint`].
    pub id: String,
    pub kind: DeviceKind,
    pub model: String,
    pub os_name: String,
    pub os_version: String,
    pub app_version: String,
}

impl DeviceIdentity {
    /// Value sent as `X-Device-OS`.
    pub fn os_label(&self) -> String {
        format!("{} {}", self.os_name, self.os_version)
    }
}

/// A persisted identity plus the network address resolved for this call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIdentity {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    /// Best-effort current address; [`UNKNOWN`] when it could not be resolved.
    pub current_address: String,
}

impl ResolvedIdentity {
    pub fn new(identity: DeviceIdentity, current_address: Option<String>) -> Self {
        let current_address = current_address
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());
        ResolvedIdentity {
            identity,
            current_address,
        }
    }
}

// =============================================================================
// Network State
// =============================================================================

/// Kind of network link the device is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    None,
    Wifi,
    Cellular,
    Ethernet,
    #[default]
    Unknown,
}

/// Snapshot of the device's connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub is_connected: bool,
    pub is_internet_reachable: bool,
    pub kind: NetworkKind,
}

impl NetworkState {
    /// State reported when the platform cannot be queried.
    pub fn offline() -> Self {
        NetworkState::default()
    }

    /// True when a request has a chance of reaching the backend.
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable
    }
}

// =============================================================================
// Location
// =============================================================================

/// Coarse movement state attached to every location sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Traveling,
    Browsing,
    Idle,
}

/// A raw position fix as reported by the platform provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters, when the provider reports one.
    pub accuracy: Option<f64>,
    /// Instantaneous speed in meters per second, when reported.
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// One emitted location sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub subject_id: String,
    pub device_address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    #[ts(as = "String")]
    pub sampled_at: DateTime<Utc>,
    pub activity: Activity,
}

impl LocationSample {
    /// Builds a sample from a fix, classifying activity from its speed.
    pub fn from_fix(subject_id: &str, device_address: &str, fix: &PositionFix) -> Self {
        LocationSample {
            subject_id: subject_id.to_string(),
            device_address: device_address.to_string(),
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy_meters: fix.accuracy.unwrap_or(0.0),
            sampled_at: fix.timestamp,
            activity: Activity::from_speed(fix.speed),
        }
    }
}

/// One postal address returned by reverse geocoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

impl PostalAddress {
    /// Formats as `"street, city, region, country"` with missing parts empty.
    pub fn display_line(&self) -> String {
        let part = |p: &Option<String>| p.clone().unwrap_or_default();
        format!(
            "{}, {}, {}, {}",
            part(&self.street),
            part(&self.city),
            part(&self.region),
            part(&self.country)
        )
        .trim()
        .to_string()
    }
}

// =============================================================================
// Cache & Queue Envelopes
// =============================================================================

/// Envelope persisted by `cache_with_ttl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub payload: T,
    pub written_at: DateTime<Utc>,
    /// Time to live in milliseconds.
    pub ttl_ms: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T, written_at: DateTime<Utc>, ttl: std::time::Duration) -> Self {
        CacheEntry {
            payload,
            written_at,
            ttl_ms: ttl.as_millis().min(u64::MAX as u128) as u64,
        }
    }

    /// An entry is fresh while `now - written_at <= ttl` (inclusive).
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let ttl = Duration::milliseconds(self.ttl_ms.min(i64::MAX as u64) as i64);
        now.signed_duration_since(self.written_at) <= ttl
    }
}

/// A mutation recorded while offline, replayed later in queue order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAction {
    #[ts(type = "unknown")]
    pub payload: serde_json::Value,
    #[ts(as = "String")]
    pub queued_at: DateTime<Utc>,
}

// =============================================================================
// Notifications
// =============================================================================

/// Severity of a transient user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    #[default]
    Info,
    Warning,
    Error,
}

/// Payload of the "show transient notification" topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Toast {
    pub message: String,
    pub severity: Severity,
}

impl Toast {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Toast {
            message: message.into(),
            severity,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
