pub mod channel;
pub mod session;

pub use channel::{ConnectionObserver, DeviceCommandChannel, DeviceEvent, InstallFailure};
pub use session::{ErrorKind, UpdateSession, UpdateStatus};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::binary::{locate, BinaryDescriptor, ImageKind};
use crate::catalog::{ChannelPolicy, Release, ReleaseCatalog};
use crate::device::{
    await_reconnect, DeviceFamily, DeviceMode, DeviceRegistry, ReconnectExpectation,
    ReconnectOutcome,
};
use crate::resolver::{resolve, ResolutionResult, ResolverOptions};

/// Orchestrator settings, typically loaded from application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub channel_policy: ChannelPolicy,
    pub base_url_stable: String,
    pub base_url_beta: String,
    pub reconnect_window_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_policy: ChannelPolicy::StableOnly,
            base_url_stable: "https://releases.keylink.example/firmware".into(),
            base_url_beta: "https://releases.keylink.example/firmware-beta".into(),
            reconnect_window_ms: 5 * 60 * 1000,
        }
    }
}

impl OrchestratorConfig {
    fn reconnect_window(&self) -> Duration {
        Duration::from_millis(self.reconnect_window_ms)
    }

    fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            channel_policy: self.channel_policy,
            base_url_stable: self.base_url_stable.clone(),
            base_url_beta: self.base_url_beta.clone(),
        }
    }
}

/// Which install an attempt is performing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstallStage {
    /// Staging step of a two-phase update.
    Intermediary,
    /// The resolved target itself.
    Final,
}

#[derive(Debug, Clone)]
struct InstallPlan {
    stage: InstallStage,
    descriptor: BinaryDescriptor,
    target: Release,
    family: DeviceFamily,
}

/// Merged signal stream of one attempt: transport events and the install
/// call's own resolution, consumed in arrival order by a single loop.
enum Signal {
    Event(DeviceEvent),
    Resolved(Result<(), InstallFailure>),
}

/// Drives the end-to-end firmware update sequence: validate, resolve, locate,
/// install, reconnect. Owns one [`UpdateSession`] per device; the device
/// connection is exclusively its for the duration of an attempt.
#[derive(Clone)]
pub struct UpdateOrchestrator {
    sessions: Arc<RwLock<HashMap<Uuid, UpdateSession>>>,
    /// Devices claimed by a running attempt. A claim outlives a session reset:
    /// it is held until the attempt's install call has actually resolved, so
    /// two install commands can never overlap on one device.
    claimed: Arc<Mutex<HashSet<Uuid>>>,
    registry: Arc<DeviceRegistry>,
    channel: Arc<dyn DeviceCommandChannel>,
    observer: Arc<dyn ConnectionObserver>,
    catalog: Arc<RwLock<ReleaseCatalog>>,
    config: OrchestratorConfig,
}

impl UpdateOrchestrator {
    pub fn new(
        channel: Arc<dyn DeviceCommandChannel>,
        observer: Arc<dyn ConnectionObserver>,
        registry: Arc<DeviceRegistry>,
        catalog: ReleaseCatalog,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            claimed: Arc::new(Mutex::new(HashSet::new())),
            registry,
            channel,
            observer,
            catalog: Arc::new(RwLock::new(catalog)),
            config,
        }
    }

    /// Keep the device registry in sync with the transport's connection
    /// stream. Must be called from within a runtime.
    pub fn watch_connections(&self) {
        self.registry.watch(self.observer.as_ref());
    }

    /// Swap in a freshly fetched release catalog.
    pub async fn set_catalog(&self, catalog: ReleaseCatalog) {
        *self.catalog.write().await = catalog;
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Read-only snapshot of a device's session.
    pub async fn get_session(&self, device_id: Uuid) -> Option<UpdateSession> {
        self.sessions.read().await.get(&device_id).cloned()
    }

    /// Discard a device's session state, returning the fresh idle session.
    /// Any still-running attempt for the old session is fenced out.
    pub async fn reset_session(&self, device_id: Uuid) -> UpdateSession {
        let mut sessions = self.sessions.write().await;
        let fresh = sessions
            .get(&device_id)
            .map(UpdateSession::reset)
            .unwrap_or_default();
        log::info!("Session for device {} reset", device_id);
        sessions.insert(device_id, fresh.clone());
        fresh
    }

    /// Start an update attempt for `device_id` and return the session
    /// snapshot. Validation and resolution failures are decided here, before
    /// any device command; asynchronous progress is observed via
    /// [`get_session`].
    ///
    /// A request while an attempt is in flight, while a failed attempt awaits
    /// reset, or while a previous attempt's device command is still
    /// outstanding (even across a reset) is a no-op returning the current
    /// session.
    pub async fn request_update(&self, device_id: Uuid) -> UpdateSession {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&device_id) {
                if session.blocks_new_attempt() {
                    log::warn!(
                        "Update for device {} already {} - ignoring request",
                        device_id,
                        if session.in_flight { "in progress" } else { "failed, awaiting reset" }
                    );
                    return session.clone();
                }
            }
        }

        // Claim the device before touching anything else. The claim is the
        // exclusivity guard: it is taken atomically (so concurrent requests
        // admit exactly one attempt) and survives a session reset (so a reset
        // cannot start a second flash while the first install call is still
        // outstanding).
        if !self.claimed.lock().await.insert(device_id) {
            log::warn!(
                "Device {} still owned by an outstanding command - ignoring request",
                device_id
            );
            return self.get_session(device_id).await.unwrap_or_default();
        }

        let plan = match self.prepare_attempt(device_id).await {
            Ok(plan) => plan,
            Err(kind) => {
                self.claimed.lock().await.remove(&device_id);
                return self.fail_validation(device_id, kind).await;
            }
        };

        let snapshot = {
            let mut sessions = self.sessions.write().await;
            let session = sessions.entry(device_id).or_default();
            session.status = UpdateStatus::Started;
            session.error = None;
            session.installing_progress = 0;
            session.target_release = Some(plan.target.clone());
            session.in_flight = true;
            session.clone()
        };
        log::info!(
            "Update started for device {}: {} {} via {}",
            device_id,
            match plan.stage {
                InstallStage::Intermediary => "staged toward",
                InstallStage::Final => "installing",
            },
            plan.target.version,
            plan.descriptor.filename
        );

        // Subscribe before issuing the command so no event is missed.
        let events = self.channel.events();
        let this = self.clone();
        let generation = snapshot.generation;
        tokio::spawn(async move {
            this.run_attempt(device_id, generation, plan, events).await;
            this.claimed.lock().await.remove(&device_id);
        });

        snapshot
    }

    /// Validate the device and resolve what to install. Pure decision making;
    /// never touches the command channel.
    async fn prepare_attempt(&self, device_id: Uuid) -> Result<InstallPlan, ErrorKind> {
        let Some(device) = self.registry.get(&device_id).await else {
            log::error!("Update requested for unknown device {}", device_id);
            return Err(ErrorKind::NoDevice);
        };
        if !device.in_bootloader_mode {
            log::error!("Device {} is not in bootloader mode", device_id);
            return Err(ErrorKind::NotInBootloader);
        }

        let resolution = {
            let catalog = self.catalog.read().await;
            resolve(&device, &catalog, &self.config.resolver_options())
        };

        match resolution {
            Ok(ResolutionResult::DirectUpdate { target, binary }) => Ok(InstallPlan {
                stage: InstallStage::Final,
                descriptor: binary,
                target,
                family: device.family,
            }),
            Ok(ResolutionResult::StagedUpdate {
                intermediary,
                target,
            }) => {
                let descriptor = locate(
                    &intermediary,
                    device.family,
                    ImageKind::Intermediary,
                    &self.config.base_url_stable,
                    &self.config.base_url_beta,
                )
                .map_err(|err| {
                    log::error!("Intermediary binary for {} unusable: {}", device_id, err);
                    ErrorKind::InvalidBinaryLocation(err.to_string())
                })?;
                Ok(InstallPlan {
                    stage: InstallStage::Intermediary,
                    descriptor,
                    target,
                    family: device.family,
                })
            }
            Ok(ResolutionResult::NoUpdate) => {
                log::warn!("No safe update path for device {}", device_id);
                Err(ErrorKind::ResolutionExhausted)
            }
            Err(err) => {
                log::error!("Binary for device {} unusable: {}", device_id, err);
                Err(ErrorKind::InvalidBinaryLocation(err.to_string()))
            }
        }
    }

    /// The per-attempt transition loop. Device events and the install call's
    /// outcome are funneled through one queue; the outcome always wins over
    /// events still queued behind it.
    async fn run_attempt(
        &self,
        device_id: Uuid,
        generation: u64,
        plan: InstallPlan,
        events: broadcast::Receiver<DeviceEvent>,
    ) {
        if plan.stage == InstallStage::Intermediary {
            self.transition(device_id, generation, |s| {
                s.status = UpdateStatus::InstallingIntermediary;
            })
            .await;
        }

        let (tx, mut rx) = mpsc::channel::<Signal>(64);

        let forward_tx = tx.clone();
        let forwarder = tokio::spawn(async move {
            let mut events = events;
            loop {
                match events.recv().await {
                    Ok(event) if event.device_id() == device_id => {
                        if forward_tx.send(Signal::Event(event)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("Update attempt lagged {} device events", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let call_channel = Arc::clone(&self.channel);
        let descriptor = plan.descriptor.clone();
        tokio::spawn(async move {
            let outcome = call_channel.install_firmware(device_id, &descriptor).await;
            let _ = tx.send(Signal::Resolved(outcome)).await;
        });

        let outcome = loop {
            match rx.recv().await {
                Some(Signal::Event(DeviceEvent::ConfirmationRequested { .. })) => {
                    self.transition(device_id, generation, |s| {
                        s.status = UpdateStatus::WaitingForConfirmation;
                    })
                    .await;
                }
                Some(Signal::Event(DeviceEvent::Progress { percent, .. })) => {
                    self.transition(device_id, generation, |s| {
                        s.status = UpdateStatus::Installing;
                        s.installing_progress = percent.min(100);
                    })
                    .await;
                }
                Some(Signal::Resolved(outcome)) => break outcome,
                None => return,
            }
        };
        // Call resolution takes precedence; drop whatever events still queue.
        forwarder.abort();

        match outcome {
            Ok(()) => self.finish_success(device_id, generation, plan).await,
            Err(failure) if failure.cancelled => {
                // Benign: the user declined on the device. Status stays where
                // it was so the flow can be re-triggered directly.
                log::info!("Install cancelled on device {}", device_id);
                self.transition(device_id, generation, |s| {
                    s.in_flight = false;
                })
                .await;
            }
            Err(failure) => {
                log::error!("Install failed on device {}: {}", device_id, failure);
                self.fail(device_id, generation, ErrorKind::CommandFailure(failure.message))
                    .await;
            }
        }
    }

    async fn finish_success(&self, device_id: Uuid, generation: u64, plan: InstallPlan) {
        // A fenced-out attempt stops here instead of waiting out the
        // reconnect window with the device claim held.
        let expected_mode = match plan.stage {
            InstallStage::Intermediary => {
                if !self
                    .transition(device_id, generation, |s| {
                        s.intermediary_installed = true;
                        s.status = UpdateStatus::IntermediaryInstalled;
                    })
                    .await
                {
                    return;
                }
                self.transition(device_id, generation, |s| {
                    s.status = UpdateStatus::Unplug;
                })
                .await;
                // The final install continues from bootloader mode.
                DeviceMode::Bootloader
            }
            InstallStage::Final => {
                let status = match plan.family.reconnect_after_install() {
                    ReconnectExpectation::Reboot => UpdateStatus::WaitForReboot,
                    ReconnectExpectation::Unplug => UpdateStatus::Unplug,
                };
                if !self
                    .transition(device_id, generation, |s| s.status = status)
                    .await
                {
                    return;
                }
                DeviceMode::Normal
            }
        };

        let reconnect = await_reconnect(
            self.observer.subscribe(),
            device_id,
            expected_mode,
            self.config.reconnect_window(),
        )
        .await;

        match reconnect {
            ReconnectOutcome::Connected(state) => {
                self.registry.insert(device_id, state).await;
                log::info!("Update attempt for device {} completed", device_id);
                self.transition(device_id, generation, |s| {
                    s.status = UpdateStatus::Idle;
                    s.in_flight = false;
                })
                .await;
            }
            ReconnectOutcome::TimedOut => {
                self.fail(device_id, generation, ErrorKind::ReconnectTimeout)
                    .await;
            }
        }
    }

    /// Record a validation failure without ever touching the command channel.
    async fn fail_validation(&self, device_id: Uuid, kind: ErrorKind) -> UpdateSession {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(device_id).or_default();
        session.status = UpdateStatus::Error;
        session.error = Some(kind);
        session.clone()
    }

    async fn fail(&self, device_id: Uuid, generation: u64, kind: ErrorKind) {
        self.transition(device_id, generation, |s| {
            s.status = UpdateStatus::Error;
            s.error = Some(kind);
            s.in_flight = false;
        })
        .await;
    }

    /// Apply a session mutation unless the session was reset (or replaced)
    /// since the attempt started.
    async fn transition<F>(&self, device_id: Uuid, generation: u64, mutate: F) -> bool
    where
        F: FnOnce(&mut UpdateSession),
    {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&device_id) {
            Some(session) if session.generation == generation => {
                let before = session.status;
                mutate(session);
                if session.status != before {
                    log::info!(
                        "Update status for device {}: {} -> {}",
                        device_id,
                        before,
                        session.status
                    );
                }
                true
            }
            _ => {
                log::debug!(
                    "Discarding stale session write for device {} (generation {})",
                    device_id,
                    generation
                );
                false
            }
        }
    }
}
