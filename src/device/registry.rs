use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::orchestrator::channel::ConnectionObserver;

use super::models::{ConnectionEvent, DeviceState};

/// Bookkeeping of currently connected devices, fed by the transport's
/// connection events. The orchestrator validates update requests against this
/// view instead of querying the transport directly.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<Uuid, DeviceState>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Spawn a background task keeping the registry in sync with the
    /// observer's connection stream. Runs until the stream closes.
    pub fn watch(self: &Arc<Self>, observer: &dyn ConnectionObserver) {
        let mut events = observer.subscribe();
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                registry.apply(event).await;
            }
            log::debug!("Connection stream closed, registry watcher stopping");
        });
    }

    pub async fn apply(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { id, state } => {
                log::info!(
                    "Device {} connected ({:?}, bootloader {}, mode {:?})",
                    id,
                    state.family,
                    state.bootloader_version,
                    state.mode()
                );
                self.devices.write().await.insert(id, state);
            }
            ConnectionEvent::Disconnected { id } => {
                log::info!("Device {} disconnected", id);
                self.devices.write().await.remove(&id);
            }
        }
    }

    /// Insert or replace a device directly, bypassing the event stream.
    pub async fn insert(&self, id: Uuid, state: DeviceState) {
        self.devices.write().await.insert(id, state);
    }

    pub async fn remove(&self, id: &Uuid) -> Option<DeviceState> {
        self.devices.write().await.remove(id)
    }

    pub async fn get(&self, id: &Uuid) -> Option<DeviceState> {
        self.devices.read().await.get(id).cloned()
    }

    pub async fn connected_devices(&self) -> Vec<(Uuid, DeviceState)> {
        self.devices
            .read()
            .await
            .iter()
            .map(|(id, state)| (*id, state.clone()))
            .collect()
    }
}
