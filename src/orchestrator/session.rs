use serde::{Deserialize, Serialize};

use crate::catalog::Release;

/// Closed set of update statuses. The serialized names are stable strings the
/// UI and telemetry bind to; renaming one is a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStatus {
    Idle,
    Started,
    InstallingIntermediary,
    IntermediaryInstalled,
    Unplug,
    WaitingForConfirmation,
    Installing,
    WaitForReboot,
    Error,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Idle => "idle",
            UpdateStatus::Started => "started",
            UpdateStatus::InstallingIntermediary => "installing-intermediary",
            UpdateStatus::IntermediaryInstalled => "intermediary-installed",
            UpdateStatus::Unplug => "unplug",
            UpdateStatus::WaitingForConfirmation => "waiting-for-confirmation",
            UpdateStatus::Installing => "installing",
            UpdateStatus::WaitForReboot => "wait-for-reboot",
            UpdateStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an update attempt ended in `error` status. On-device cancellation is
/// deliberately absent: it is benign and never becomes an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "detail")]
pub enum ErrorKind {
    #[error("no device")]
    NoDevice,

    #[error("device must be connected in bootloader mode")]
    NotInBootloader,

    #[error("no safe update path for this device")]
    ResolutionExhausted,

    /// The resolved release exists but its download location is malformed,
    /// which points at broken base-URL configuration rather than an empty
    /// catalog.
    #[error("firmware binary location is invalid: {0}")]
    InvalidBinaryLocation(String),

    #[error("firmware install failed: {0}")]
    CommandFailure(String),

    #[error("device did not reconnect in the expected mode")]
    ReconnectTimeout,
}

/// Mutable state of one user-initiated update attempt for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSession {
    pub status: UpdateStatus,
    pub error: Option<ErrorKind>,
    pub intermediary_installed: bool,
    pub installing_progress: u8,
    pub target_release: Option<Release>,
    /// True while an install attempt's task is running. Not part of the UI
    /// snapshot contract.
    #[serde(skip)]
    pub(crate) in_flight: bool,
    /// Bumped on every reset; a running attempt re-checks it before writing
    /// so late writes after a reset are discarded.
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl UpdateSession {
    pub fn new() -> Self {
        Self {
            status: UpdateStatus::Idle,
            error: None,
            intermediary_installed: false,
            installing_progress: 0,
            target_release: None,
            in_flight: false,
            generation: 0,
        }
    }

    /// Fresh idle session carrying over the reset fence.
    pub(crate) fn reset(&self) -> Self {
        Self {
            generation: self.generation + 1,
            ..Self::new()
        }
    }

    /// Whether a new update request must be rejected: either an attempt is
    /// running, or a failed attempt awaits an explicit reset.
    pub(crate) fn blocks_new_attempt(&self) -> bool {
        self.in_flight || self.status == UpdateStatus::Error
    }
}

impl Default for UpdateSession {
    fn default() -> Self {
        Self::new()
    }
}
