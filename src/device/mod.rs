pub mod gate;
pub mod models;
pub mod registry;

pub use gate::{await_reconnect, ReconnectOutcome};
pub use models::*;
pub use registry::DeviceRegistry;
