use tokio::sync::broadcast;
use uuid::Uuid;

use crate::binary::BinaryDescriptor;
use crate::device::ConnectionEvent;

/// Discrete events the transport emits while an install call is outstanding.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// Device is showing its physical confirmation prompt.
    ConfirmationRequested { device_id: Uuid },
    /// Flash progress, 0..=100.
    Progress { device_id: Uuid, percent: u8 },
}

impl DeviceEvent {
    pub fn device_id(&self) -> Uuid {
        match self {
            DeviceEvent::ConfirmationRequested { device_id }
            | DeviceEvent::Progress { device_id, .. } => *device_id,
        }
    }
}

/// Structured install failure. `cancelled` is set by the transport when the
/// user rejected the install on the device itself; that outcome is benign and
/// must never surface as an error.
#[derive(Debug, Clone)]
pub struct InstallFailure {
    pub cancelled: bool,
    pub message: String,
}

impl InstallFailure {
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            message: "cancelled on device".into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            cancelled: false,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Command side of the device transport. One long-lived install call per
/// attempt; events arrive on a separate stream while the call is outstanding.
#[async_trait::async_trait]
pub trait DeviceCommandChannel: Send + Sync {
    async fn install_firmware(
        &self,
        device_id: Uuid,
        descriptor: &BinaryDescriptor,
    ) -> Result<(), InstallFailure>;

    /// Subscribe to the event stream. Each subscription sees events emitted
    /// after it was created.
    fn events(&self) -> broadcast::Receiver<DeviceEvent>;
}

/// Connection side of the device transport.
pub trait ConnectionObserver: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;
}
