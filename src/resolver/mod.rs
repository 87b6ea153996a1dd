pub mod rollout;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::binary::{self, locate, BinaryDescriptor, ImageKind};
use crate::catalog::{ChannelPolicy, Release, ReleaseCatalog};
use crate::device::DeviceState;

/// Caller-supplied policy for a resolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverOptions {
    pub channel_policy: ChannelPolicy,
    pub base_url_stable: String,
    pub base_url_beta: String,
}

/// Outcome of matching a device against the release catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionResult {
    /// Nothing newer, or no safe path to anything newer.
    NoUpdate,
    /// Target can be flashed in one step.
    DirectUpdate {
        target: Release,
        binary: BinaryDescriptor,
    },
    /// An intermediary must be flashed first to raise the bootloader.
    StagedUpdate {
        intermediary: Release,
        target: Release,
    },
}

/// Whether `release` may be flashed as a final image from the device's
/// current state: the device's bootloader meets the release's minimum, and
/// installing it would not downgrade the bootloader.
fn directly_installable(release: &Release, device: &DeviceState) -> bool {
    if release.min_bootloader_version > device.bootloader_version {
        return false;
    }
    match &release.bootloader_version {
        Some(shipped) => *shipped >= device.bootloader_version,
        None => true,
    }
}

/// Whether flashing `candidate`'s intermediary image leaves the device able
/// to install `target` directly.
fn raises_bootloader_for(candidate: &Release, target: &Release) -> bool {
    candidate
        .intermediary_bootloader
        .as_ref()
        .is_some_and(|raised| *raised >= target.min_bootloader_version)
}

/// Highest-versioned release in `releases`; on duplicate versions the entry
/// appearing first wins (catalog order is authoritative).
fn highest<'a>(releases: impl Iterator<Item = &'a Release>) -> Option<&'a Release> {
    let mut best: Option<&Release> = None;
    for release in releases {
        if best.map_or(true, |b| release.version > b.version) {
            best = Some(release);
        }
    }
    best
}

/// Map a device's state and the release catalog to an update decision.
///
/// Pure and deterministic: no I/O, no shared state, identical inputs always
/// produce identical output. The only failure mode is a structurally invalid
/// download location for the chosen release.
pub fn resolve(
    device: &DeviceState,
    catalog: &ReleaseCatalog,
    options: &ResolverOptions,
) -> binary::Result<ResolutionResult> {
    // Candidates: right family, offered channel, inside the rollout fraction.
    let gated: Vec<&Release> = catalog
        .releases_for(device.family)
        .iter()
        .filter(|r| options.channel_policy.allows(r.channel))
        .filter(|r| {
            rollout::is_in_rollout(&device.stable_identifier, &r.version, r.rollout_percentage)
        })
        .collect();

    if gated.is_empty() {
        log::debug!(
            "No eligible releases for {:?} (device {})",
            device.family,
            device.stable_identifier
        );
        return Ok(ResolutionResult::NoUpdate);
    }

    // Never downgrade, never reinstall the running version.
    let installed: Option<&Version> = device
        .firmware_present
        .then_some(device.firmware_version.as_ref())
        .flatten();
    let upgrades: Vec<&Release> = gated
        .iter()
        .copied()
        .filter(|r| installed.map_or(true, |cur| r.version > *cur))
        .collect();

    let Some(target) = highest(upgrades.iter().copied()) else {
        log::debug!(
            "Device {} already at or above every catalog entry",
            device.stable_identifier
        );
        return Ok(ResolutionResult::NoUpdate);
    };

    let descriptor_for = |release: &Release| {
        locate(
            release,
            device.family,
            ImageKind::Firmware,
            &options.base_url_stable,
            &options.base_url_beta,
        )
    };

    if directly_installable(target, device) {
        let binary = descriptor_for(target)?;
        return Ok(ResolutionResult::DirectUpdate {
            target: target.clone(),
            binary,
        });
    }

    // The newest release cannot be installed from this bootloader. Prefer the
    // closest directly installable step; a later resolution continues from
    // the state that step leaves behind.
    if let Some(step) = highest(
        upgrades
            .iter()
            .copied()
            .filter(|r| !std::ptr::eq(*r, target) && directly_installable(r, device)),
    ) {
        log::info!(
            "Target {} needs bootloader {}, offering direct step {} instead",
            target.version,
            target.min_bootloader_version,
            step.version
        );
        let binary = descriptor_for(step)?;
        return Ok(ResolutionResult::DirectUpdate {
            target: step.clone(),
            binary,
        });
    }

    // Staged path, only for families with non-atomic bootloader transitions.
    // The installed-version filter does not apply to the intermediary: an
    // older image is acceptable as a stepping stone.
    if device.family.requires_staged_update() {
        if let Some(intermediary) = highest(gated.iter().copied().filter(|r| {
            r.min_bootloader_version <= device.bootloader_version
                && raises_bootloader_for(r, target)
        })) {
            log::info!(
                "Staged update: intermediary {} raises bootloader for target {}",
                intermediary.version,
                target.version
            );
            return Ok(ResolutionResult::StagedUpdate {
                intermediary: intermediary.clone(),
                target: target.clone(),
            });
        }
    }

    log::warn!(
        "No safe update path for device {} (bootloader {}, target {})",
        device.stable_identifier,
        device.bootloader_version,
        target.version
    );
    Ok(ResolutionResult::NoUpdate)
}
