use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use super::models::{ConnectionEvent, DeviceMode, DeviceState};

/// Outcome of waiting for a device to come back after an unplug/reboot step.
#[derive(Debug, Clone)]
pub enum ReconnectOutcome {
    Connected(DeviceState),
    TimedOut,
}

/// Wait until `device_id` reports back in `expected_mode`, or the window
/// elapses. Connection events for other devices or the wrong mode are ignored;
/// a replug cycle (disconnect then connect) is expected traffic here.
pub async fn await_reconnect(
    mut events: broadcast::Receiver<ConnectionEvent>,
    device_id: Uuid,
    expected_mode: DeviceMode,
    window: Duration,
) -> ReconnectOutcome {
    log::debug!(
        "Waiting up to {:?} for device {} to reconnect in {:?} mode",
        window,
        device_id,
        expected_mode
    );

    let wait = async {
        loop {
            match events.recv().await {
                Ok(ConnectionEvent::Connected { id, state })
                    if id == device_id && state.mode() == expected_mode =>
                {
                    return Some(state);
                }
                Ok(_) => continue,
                // Lagged receivers skip ahead; keep listening for the device.
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Reconnect gate lagged {} connection events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    };

    match tokio::time::timeout(window, wait).await {
        Ok(Some(state)) => {
            log::info!(
                "Device {} reconnected in {:?} mode (bootloader {})",
                device_id,
                expected_mode,
                state.bootloader_version
            );
            ReconnectOutcome::Connected(state)
        }
        Ok(None) => {
            log::warn!("Connection stream closed while waiting for device {}", device_id);
            ReconnectOutcome::TimedOut
        }
        Err(_) => {
            log::warn!(
                "Device {} did not reconnect in {:?} mode within {:?}",
                device_id,
                expected_mode,
                window
            );
            ReconnectOutcome::TimedOut
        }
    }
}
