//! Shared doubles for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use imutis_core::{NetworkKind, NetworkState, SystemClock};
use imutis_store::{MemoryKvStore, Storage};

use crate::device::{NetworkProbe, PlatformInfo};
use crate::error::{ClientError, ClientResult};

/// Storage over a fresh in-memory store.
pub fn storage() -> Storage {
    Storage::new(Arc::new(MemoryKvStore::new()), Arc::new(SystemClock))
}

pub fn pixel_tablet() -> PlatformInfo {
    PlatformInfo {
        brand: Some("Google".into()),
        model_name: Some("Pixel Tablet".into()),
        os_name: Some("Android".into()),
        os_version: Some("14".into()),
        device_name: Some("Kitchen Tab".into()),
        is_tablet: true,
        app_version: Some("2.3.1".into()),
    }
}

/// Probe that hands out addresses in order, repeating the last one.
pub struct ScriptedProbe {
    addresses: Mutex<VecDeque<String>>,
    state: Mutex<Option<NetworkState>>,
}

impl ScriptedProbe {
    pub fn new(addresses: &[&str]) -> Self {
        ScriptedProbe {
            addresses: Mutex::new(addresses.iter().map(|a| a.to_string()).collect()),
            state: Mutex::new(Some(NetworkState {
                is_connected: true,
                is_internet_reachable: true,
                kind: NetworkKind::Wifi,
            })),
        }
    }

    /// Every query fails.
    pub fn failing() -> Self {
        ScriptedProbe {
            addresses: Mutex::new(VecDeque::new()),
            state: Mutex::new(None),
        }
    }

    pub fn set_state(&self, state: NetworkState) {
        *self.state.lock().unwrap() = Some(state);
    }
}

#[async_trait]
impl NetworkProbe for ScriptedProbe {
    async fn ip_address(&self) -> ClientResult<Option<String>> {
        let mut addresses = self.addresses.lock().unwrap();
        match addresses.len() {
            0 => Err(ClientError::Platform("no network module".into())),
            1 => Ok(addresses.front().cloned()),
            _ => Ok(addresses.pop_front()),
        }
    }

    async fn network_state(&self) -> ClientResult<NetworkState> {
        self.state
            .lock()
            .unwrap()
            .ok_or_else(|| ClientError::Platform("no network module".into()))
    }
}

/// Convenience wrapper so tests can share one probe.
pub fn probe(addresses: &[&str]) -> Arc<ScriptedProbe> {
    Arc::new(ScriptedProbe::new(addresses))
}
