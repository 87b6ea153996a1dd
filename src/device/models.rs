use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hardware generation of a KeyLink authenticator.
///
/// Generation-specific behavior (staged bootloader transitions, post-install
/// reconnect expectations) hangs off this enum so the resolver and the
/// orchestrator consult one source of truth instead of scattered branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceFamily {
    KeylinkOne,
    KeylinkTwo,
}

impl DeviceFamily {
    /// Slug used in binary filenames and catalog paths.
    pub fn slug(&self) -> &'static str {
        match self {
            DeviceFamily::KeylinkOne => "keylink-1",
            DeviceFamily::KeylinkTwo => "keylink-2",
        }
    }

    /// Whether bootloader/firmware transitions on this family are non-atomic
    /// and may require an intermediary firmware step.
    pub fn requires_staged_update(&self) -> bool {
        matches!(self, DeviceFamily::KeylinkOne)
    }

    /// How the device comes back after a successful final install.
    pub fn reconnect_after_install(&self) -> ReconnectExpectation {
        match self {
            DeviceFamily::KeylinkOne => ReconnectExpectation::Unplug,
            DeviceFamily::KeylinkTwo => ReconnectExpectation::Reboot,
        }
    }
}

/// Post-install reconnect behavior of a device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectExpectation {
    /// Device reboots itself into normal mode.
    Reboot,
    /// Device must be physically unplugged and replugged.
    Unplug,
}

/// Operating mode a connected device reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceMode {
    Normal,
    Bootloader,
}

/// Snapshot of a connected device's features, supplied by the transport
/// collaborator. Not owned by this crate; the resolver treats it as input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    pub family: DeviceFamily,
    pub in_bootloader_mode: bool,
    #[serde(with = "crate::version::triple")]
    pub bootloader_version: Version,
    pub firmware_present: bool,
    #[serde(default, with = "crate::version::triple_opt")]
    pub firmware_version: Option<Version>,
    /// Stable across reconnects; used for deterministic rollout bucketing.
    pub stable_identifier: String,
    pub last_seen: DateTime<Utc>,
}

impl DeviceState {
    pub fn mode(&self) -> DeviceMode {
        if self.in_bootloader_mode {
            DeviceMode::Bootloader
        } else {
            DeviceMode::Normal
        }
    }
}

/// Connection lifecycle events observed from the transport layer.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected { id: Uuid, state: DeviceState },
    Disconnected { id: Uuid },
}
