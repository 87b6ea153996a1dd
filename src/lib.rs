//! Firmware release resolution and staged update orchestration for KeyLink
//! hardware authenticators.
//!
//! The crate splits into a pure side and a driving side. [`resolver::resolve`]
//! maps a device's reported state and the release catalog to an update
//! decision without any I/O; [`orchestrator::UpdateOrchestrator`] executes
//! that decision against the device transport, tracking each attempt in an
//! [`orchestrator::UpdateSession`] the UI layer reads reactively.

pub mod binary;
pub mod catalog;
pub mod device;
pub mod orchestrator;
pub mod resolver;
pub mod version;

pub use binary::{BinaryDescriptor, BinaryError, BinaryFetcher};
pub use catalog::{CatalogClient, Channel, ChannelPolicy, Release, ReleaseCatalog};
pub use device::{DeviceFamily, DeviceMode, DeviceRegistry, DeviceState};
pub use orchestrator::{
    ErrorKind, OrchestratorConfig, UpdateOrchestrator, UpdateSession, UpdateStatus,
};
pub use resolver::{resolve, ResolutionResult, ResolverOptions};
