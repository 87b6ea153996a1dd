use serde::{Deserialize, Serialize};
use url::Url;

use crate::catalog::{Channel, Release};
use crate::device::DeviceFamily;

use super::{BinaryError, Result};

/// Which artifact of a release to point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// The release's firmware image itself.
    Firmware,
    /// The intermediary image bundled with the release, used as the first
    /// step of a staged update.
    Intermediary,
}

/// Resolved download location for one firmware artifact. Producing this is
/// pure string composition; actually fetching it is the boundary adapter's
/// job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryDescriptor {
    pub url: String,
    pub channel: Channel,
    pub filename: String,
}

/// Deterministic artifact filename for `(family, version)`.
fn filename(family: DeviceFamily, release: &Release, kind: ImageKind) -> String {
    match kind {
        ImageKind::Firmware => format!("{}-{}.bin", family.slug(), release.version),
        ImageKind::Intermediary => format!("{}-inter-{}.bin", family.slug(), release.version),
    }
}

/// Compose the download descriptor for a release. The base URL is chosen by
/// the release's channel; the result is validated structurally and never
/// fetched here.
pub fn locate(
    release: &Release,
    family: DeviceFamily,
    kind: ImageKind,
    base_url_stable: &str,
    base_url_beta: &str,
) -> Result<BinaryDescriptor> {
    let base = match release.channel {
        Channel::Stable => base_url_stable,
        Channel::Beta => base_url_beta,
    };
    let filename = filename(family, release, kind);
    let composed = format!("{}/{}", base.trim_end_matches('/'), filename);

    let url = Url::parse(&composed).map_err(|err| {
        log::error!("Composed firmware URL {:?} is invalid: {}", composed, err);
        BinaryError::NotFound(composed.clone())
    })?;

    Ok(BinaryDescriptor {
        url: url.into(),
        channel: release.channel,
        filename,
    })
}
