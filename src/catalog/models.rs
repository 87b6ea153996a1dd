use std::collections::HashMap;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::device::DeviceFamily;

/// Release train a firmware build was published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Beta,
}

/// Caller-supplied policy deciding which channels a device is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelPolicy {
    StableOnly,
    StableAndBeta,
}

impl ChannelPolicy {
    pub fn allows(&self, channel: Channel) -> bool {
        match self {
            ChannelPolicy::StableOnly => channel == Channel::Stable,
            ChannelPolicy::StableAndBeta => true,
        }
    }
}

/// One published firmware image in a family's release catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    #[serde(with = "crate::version::triple")]
    pub version: Version,
    #[serde(default)]
    pub channel: Channel,
    /// Minimum bootloader the device must already run for a direct install.
    #[serde(with = "crate::version::triple")]
    pub min_bootloader_version: Version,
    /// Bootloader this image leaves on the device, when the catalog knows it.
    /// Installing a release whose bootloader is older than the device's
    /// current one would downgrade the bootloader and is never safe.
    #[serde(default, with = "crate::version::triple_opt")]
    pub bootloader_version: Option<Version>,
    /// Bootloader bundled with this release's intermediary image. Only
    /// releases carrying this field can serve as the staging step of a
    /// two-phase update.
    #[serde(default, with = "crate::version::triple_opt")]
    pub intermediary_bootloader: Option<Version>,
    /// Fraction (0..=100) of eligible devices offered this release.
    #[serde(default = "default_rollout")]
    pub rollout_percentage: u8,
    #[serde(default)]
    pub changelog: String,
    #[serde(default)]
    pub is_latest: bool,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
    /// SHA-256 hex digest of the firmware binary, when published.
    #[serde(default)]
    pub fingerprint: Option<String>,
}

fn default_rollout() -> u8 {
    100
}

/// Releases known per device family. Catalog order within a family is
/// authoritative: on duplicate versions the entry appearing first wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseCatalog {
    releases: HashMap<DeviceFamily, Vec<Release>>,
}

impl ReleaseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single family's `releases.json` document.
    pub fn parse_family(family: DeviceFamily, json: &str) -> super::Result<Self> {
        let releases: Vec<Release> = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        catalog.insert_family(family, releases);
        Ok(catalog)
    }

    pub fn insert_family(&mut self, family: DeviceFamily, releases: Vec<Release>) {
        log::debug!("Catalog now holds {} releases for {:?}", releases.len(), family);
        self.releases.insert(family, releases);
    }

    pub fn releases_for(&self, family: DeviceFamily) -> &[Release] {
        self.releases.get(&family).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.releases.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_family_with_defaults() {
        let json = r#"[
            {
                "version": [1, 10, 1],
                "min_bootloader_version": [1, 8, 0],
                "bootloader_version": [1, 8, 0],
                "changelog": "FIDO2 resident key fixes",
                "is_latest": true,
                "fingerprint": "ab12cd"
            },
            {
                "version": [1, 6, 3],
                "min_bootloader_version": [1, 0, 0],
                "rollout_percentage": 50
            }
        ]"#;

        let catalog = ReleaseCatalog::parse_family(DeviceFamily::KeylinkOne, json).unwrap();
        let releases = catalog.releases_for(DeviceFamily::KeylinkOne);
        assert_eq!(releases.len(), 2);

        let latest = &releases[0];
        assert_eq!(latest.version, Version::new(1, 10, 1));
        assert_eq!(latest.channel, Channel::Stable);
        assert_eq!(latest.rollout_percentage, 100);
        assert!(latest.is_latest);

        let older = &releases[1];
        assert_eq!(older.rollout_percentage, 50);
        assert!(older.bootloader_version.is_none());
        assert!(!older.is_latest);

        assert!(catalog.releases_for(DeviceFamily::KeylinkTwo).is_empty());
    }

    #[test]
    fn test_channel_policy() {
        assert!(ChannelPolicy::StableOnly.allows(Channel::Stable));
        assert!(!ChannelPolicy::StableOnly.allows(Channel::Beta));
        assert!(ChannelPolicy::StableAndBeta.allows(Channel::Beta));
    }

    #[test]
    fn test_beta_channel_parses() {
        let json = r#"[{"version":[2,5,0],"min_bootloader_version":[2,0,0],"channel":"beta"}]"#;
        let catalog = ReleaseCatalog::parse_family(DeviceFamily::KeylinkTwo, json).unwrap();
        assert_eq!(
            catalog.releases_for(DeviceFamily::KeylinkTwo)[0].channel,
            Channel::Beta
        );
    }
}
