//! # Session Token Store
//!
//! Holds at most one session token. Only the gateway writes it: through
//! `set_auth_token`, `clear_auth_token`, or the 401 response path.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌─────────────────┐      set(token)       ┌─────────────────┐       │
//! │   │ Unauthenticated │ ────────────────────► │  Authenticated  │       │
//! │   │                 │ ◄──────────────────── │                 │       │
//! │   └─────────────────┘   401 | clear()       └─────────────────┘       │
//! │          │  ▲                                                           │
//! │          └──┘ 401 while unauthenticated: no change                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Persistence
//! When built with [`TokenStore::persistent`], every change is mirrored to
//! [`storage_keys::AUTH_TOKEN`] and [`TokenStore::restore`] reloads it at
//! startup.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use imutis_core::storage_keys;
use imutis_store::Storage;

/// Shared handle to the current session token.
#[derive(Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
    storage: Option<Storage>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("persistent", &self.storage.is_some())
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    /// In-memory only store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store mirrored to durable storage.
    pub fn persistent(storage: Storage) -> Self {
        TokenStore {
            token: Arc::default(),
            storage: Some(storage),
        }
    }

    /// Reloads a previously persisted token. Returns whether one was found.
    pub async fn restore(&self) -> bool {
        let Some(storage) = &self.storage else {
            return false;
        };

        let restored: Option<String> = storage.get(storage_keys::AUTH_TOKEN).await;
        let found = restored.is_some();
        *self.token.write().await = restored;

        debug!(found, "Session token restored");
        found
    }

    /// Current token, if authenticated.
    pub async fn current(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub(crate) async fn set(&self, token: String) {
        if let Some(storage) = &self.storage {
            storage.set(storage_keys::AUTH_TOKEN, &token).await;
        }
        *self.token.write().await = Some(token);
        info!("Session token set");
    }

    /// Clears the token. Returns whether one was present.
    pub(crate) async fn clear(&self) -> bool {
        let had_token = self.token.write().await.take().is_some();
        if had_token {
            if let Some(storage) = &self.storage {
                storage.remove(storage_keys::AUTH_TOKEN).await;
            }
            info!("Session token cleared");
        }
        had_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::storage;

    #[tokio::test]
    async fn test_set_and_clear() {
        let store = TokenStore::new();
        assert!(!store.is_authenticated().await);

        store.set("abc".into()).await;
        assert_eq!(store.current().await.as_deref(), Some("abc"));

        // Replacing keeps exactly one token
        store.set("def".into()).await;
        assert_eq!(store.current().await.as_deref(), Some("def"));

        assert!(store.clear().await);
        assert!(!store.clear().await);
        assert_eq!(store.current().await, None);
    }

    #[tokio::test]
    async fn test_persistent_store_restores() {
        let storage = storage();

        let first = TokenStore::persistent(storage.clone());
        first.set("session-1".into()).await;

        let second = TokenStore::persistent(storage.clone());
        assert!(second.restore().await);
        assert_eq!(second.current().await.as_deref(), Some("session-1"));

        second.clear().await;
        let third = TokenStore::persistent(storage);
        assert!(!third.restore().await);
        assert!(!third.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = TokenStore::new();
        let view = store.clone();
        store.set("shared".into()).await;
        assert_eq!(view.current().await.as_deref(), Some("shared"));
    }
}
