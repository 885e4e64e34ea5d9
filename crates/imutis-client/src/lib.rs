//! # imutis-client: Client Platform Services
//!
//! The service layer the Imutis app is built on: one HTTP gateway to the
//! backend, a stable device identity, an in-process event bus, opt-in
//! retry, location sampling and offline replay.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Imutis Client Services                           │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 ImutisClient (client.rs, wiring)                 │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  HttpGateway   │  │ DeviceIdentity │  │  LocationSampler       │    │
//! │  │                │  │    Service     │  │                        │    │
//! │  │ Bearer token   │◄─│ Fingerprint,   │─►│ Permission gate,       │    │
//! │  │ device headers │  │ kind, OS, IP   │  │ movement filter,       │    │
//! │  │ error classify │  │ (persisted)    │  │ one-shot + watch       │    │
//! │  └───────┬────────┘  └────────────────┘  └────────────────────────┘    │
//! │          │ failures                                                     │
//! │          ▼                                                              │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │   EventBus     │  │  retry_request │  │  OfflineDrainer        │    │
//! │  │ API_ERROR,     │  │  1s, 2s, 4s... │  │ replays queued actions │    │
//! │  │ SHOW_TOAST     │  │  (opt-in)      │  │ when back online       │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  DEPENDENCIES:                                                         │
//! │  • imutis-core: Pure types (DeviceIdentity, LocationSample, ...)      │
//! │  • imutis-store: Storage (TTL cache, offline queue, persisted state)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`client`] - Service wiring from configuration
//! - [`config`] - Layered configuration (defaults, TOML, environment)
//! - [`device`] - Device identity and network probe
//! - [`error`] - Gateway and client error types
//! - [`events`] - Typed in-process publish/subscribe
//! - [`gateway`] - HTTP gateway
//! - [`location`] - Location sampling
//! - [`offline`] - Offline queue replay
//! - [`retry`] - Exponential retry helper
//! - [`telemetry`] - Tracing subscriber setup
//! - [`token`] - Session token store

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod gateway;
pub mod location;
pub mod offline;
pub mod retry;
pub mod telemetry;
pub mod token;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::ImutisClient;
pub use config::{CachedResource, ClientConfig};
pub use device::{DeviceIdentityService, DevicePlatform, NetworkProbe, PlatformInfo};
pub use error::{ClientError, ClientResult, GatewayError, GatewayResult};
pub use events::{EventBus, Subscription, Topic};
pub use gateway::{ApiRequest, ApiResponse, GatewaySettings, HttpGateway};
pub use location::{
    Geocoder, LocationError, LocationSampler, PermissionGate, PermissionStatus, PositionProvider,
    WatchHandle,
};
pub use offline::{ActionReplayer, DrainReport, GatewayReplayer, OfflineDrainer, QueuedRequest};
pub use retry::{retry_request, retry_transient};
pub use telemetry::init_tracing;
pub use token::TokenStore;
