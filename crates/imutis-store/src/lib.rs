//! # imutis-store: Durable Client State
//!
//! Everything the Imutis client keeps across restarts: the device identity,
//! the session token, cached reference data and the offline action queue.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Imutis Client Data Flow                          │
//! │                                                                         │
//! │  Device identity / token store / UI cache reads / offline queue        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   imutis-store (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Storage     │    │ KeyValueStore │    │  Migrations  │  │   │
//! │  │   │  (cache.rs)   │    │   (kv.rs)     │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ JSON + TTL    │───►│ SqliteKvStore │    │ 001_kv_store │  │   │
//! │  │   │ offline queue │    │ MemoryKvStore │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              SQLite Database (kv_store table, WAL)              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Store error types
//! - [`kv`] - String key-value backends
//! - [`cache`] - Structured values, TTL cache and offline queue
//!
//! ## Usage
//!
//! ```rust,ignore
//! use imutis_store::{Database, DbConfig, Storage};
//!
//! let db = Database::new(DbConfig::new("path/to/imutis.db")).await?;
//! let storage = Storage::new(Arc::new(db.kv_store()), Arc::new(SystemClock));
//!
//! storage.cache_with_ttl(storage_keys::CACHED_CITIES, &cities, cache_ttl::CITIES).await;
//! let cities: Option<Vec<City>> = storage.get_cached(storage_keys::CACHED_CITIES).await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cache;
pub mod error;
pub mod kv;
pub mod migrations;
pub mod pool;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::Storage;
pub use error::{StoreError, StoreResult};
pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
pub use pool::{Database, DbConfig};
