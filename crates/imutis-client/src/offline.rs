//! # Offline Queue Drainer
//!
//! Replays mutations recorded while the device was offline once it is back
//! online.
//!
//! ## Drain Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         OfflineDrainer::drain()                         │
//! │                                                                         │
//! │  1. Probe network ── offline ──► DrainReport { 0, queue.len() }        │
//! │       │ online                    (queue untouched)                     │
//! │       ▼                                                                 │
//! │  2. Snapshot queue  [A, B, C]                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  3. Replay in order                                                    │
//! │     A ── ok ──► B ── fails ──► stop                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  4. Write back [B, C] + anything queued during the drain               │
//! │     (empty ⇒ queue key removed)                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Drains on one drainer are serialized. Appends made concurrently through
//! [`Storage::queue_offline_action`] are kept as long as they land before
//! the write-back.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use imutis_core::OfflineAction;
use imutis_store::Storage;

use crate::device::DeviceIdentityService;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{ApiRequest, HttpGateway};

// =============================================================================
// Replayer
// =============================================================================

/// Performs one queued action against the backend.
#[async_trait]
pub trait ActionReplayer: Send + Sync {
    async fn replay(&self, action: &OfflineAction) -> GatewayResult<()>;
}

/// Payload shape understood by [`GatewayReplayer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    /// HTTP method name, e.g. `"POST"`.
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

impl QueuedRequest {
    pub fn new(method: &Method, path: impl Into<String>, body: Option<serde_json::Value>) -> Self {
        QueuedRequest {
            method: method.as_str().to_string(),
            path: path.into(),
            body,
        }
    }

    /// Encodes as an offline-queue payload.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "method": self.method,
            "path": self.path,
            "body": self.body,
        })
    }

    fn to_request(&self) -> GatewayResult<ApiRequest> {
        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| GatewayError::local(format!("Invalid queued method: {}", self.method)))?;

        let request = ApiRequest::new(method, self.path.clone());
        Ok(match &self.body {
            Some(body) => request.json(body.clone()),
            None => request,
        })
    }
}

/// Replays [`QueuedRequest`] payloads through the gateway.
#[derive(Clone)]
pub struct GatewayReplayer {
    gateway: HttpGateway,
}

impl GatewayReplayer {
    pub fn new(gateway: HttpGateway) -> Self {
        GatewayReplayer { gateway }
    }
}

#[async_trait]
impl ActionReplayer for GatewayReplayer {
    async fn replay(&self, action: &OfflineAction) -> GatewayResult<()> {
        let queued: QueuedRequest = serde_json::from_value(action.payload.clone())
            .map_err(|e| GatewayError::local(format!("Invalid queued request: {}", e)))?;

        let request = queued.to_request()?;
        self.gateway.send(&request).await.map(|_| ())
    }
}

// =============================================================================
// Drainer
// =============================================================================

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub replayed: usize,
    pub remaining: usize,
}

/// Replays the offline queue in order.
#[derive(Clone)]
pub struct OfflineDrainer {
    storage: Storage,
    identity: DeviceIdentityService,
    replayer: Arc<dyn ActionReplayer>,
    in_flight: Arc<Mutex<()>>,
}

impl OfflineDrainer {
    pub fn new(storage: Storage, identity: DeviceIdentityService, replayer: Arc<dyn ActionReplayer>) -> Self {
        OfflineDrainer {
            storage,
            identity,
            replayer,
            in_flight: Arc::default(),
        }
    }

    /// Replays queued actions until one fails or the queue is empty.
    pub async fn drain(&self) -> DrainReport {
        let _guard = self.in_flight.lock().await;

        let snapshot = self.storage.get_offline_queue().await;
        if snapshot.is_empty() {
            debug!("Offline queue empty");
            return DrainReport::default();
        }

        let network = self.identity.network_state().await;
        if !network.is_online() {
            debug!(queued = snapshot.len(), kind = ?network.kind, "Offline, skipping drain");
            return DrainReport {
                replayed: 0,
                remaining: snapshot.len(),
            };
        }

        info!(queued = snapshot.len(), "Draining offline queue");

        let mut replayed = 0;
        for action in &snapshot {
            match self.replayer.replay(action).await {
                Ok(()) => replayed += 1,
                Err(e) => {
                    warn!(
                        replayed,
                        queued_at = %action.queued_at,
                        error = %e,
                        "Replay failed, stopping drain"
                    );
                    break;
                }
            }
        }

        // Keep anything appended while we were replaying
        let current = self.storage.get_offline_queue().await;
        let appended = current.into_iter().skip(snapshot.len());

        let remaining: Vec<OfflineAction> = snapshot
            .into_iter()
            .skip(replayed)
            .chain(appended)
            .collect();

        self.storage.replace_offline_queue(&remaining).await;

        let report = DrainReport {
            replayed,
            remaining: remaining.len(),
        };
        info!(replayed = report.replayed, remaining = report.remaining, "Offline drain finished");
        report
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
