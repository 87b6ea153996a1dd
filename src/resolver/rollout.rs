use semver::Version;

/// Deterministic rollout bucket for a `(device, version)` pair, 0..=99.
///
/// The bucket is a pure function of the device's stable identifier and the
/// release version, so repeated resolutions (and resolutions on different
/// hosts) always land the same device in the same bucket.
pub fn bucket(stable_identifier: &str, version: &Version) -> u8 {
    let key = format!("{}:{}", stable_identifier, version);
    (crc32fast::hash(key.as_bytes()) % 100) as u8
}

/// Whether a device falls inside a release's rollout fraction. 100 is always
/// in; 0 means the release is disabled regardless of the hash.
pub fn is_in_rollout(stable_identifier: &str, version: &Version, rollout_percentage: u8) -> bool {
    match rollout_percentage {
        100.. => true,
        0 => false,
        pct => bucket(stable_identifier, version) < pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_is_stable() {
        let version = Version::new(1, 10, 1);
        let first = bucket("serial-A1B2C3", &version);
        for _ in 0..10 {
            assert_eq!(bucket("serial-A1B2C3", &version), first);
        }
    }

    #[test]
    fn test_bucket_varies_by_version() {
        let id = "serial-A1B2C3";
        let buckets: Vec<u8> = (0..20)
            .map(|patch| bucket(id, &Version::new(1, 10, patch)))
            .collect();
        // Not every pair can differ, but the hash must not collapse to one bucket.
        assert!(buckets.iter().any(|b| *b != buckets[0]));
    }

    #[test]
    fn test_full_and_zero_rollout() {
        let version = Version::new(2, 0, 0);
        assert!(is_in_rollout("any", &version, 100));
        assert!(!is_in_rollout("any", &version, 0));
    }

    #[test]
    fn test_partial_rollout_matches_bucket() {
        let version = Version::new(1, 6, 3);
        let id = "serial-rollout";
        let b = bucket(id, &version);
        assert_eq!(is_in_rollout(id, &version, 50), b < 50);
        // One past the bucket always admits the device.
        if b < 99 {
            assert!(is_in_rollout(id, &version, b + 1));
        }
        // Exactly the bucket value never does.
        if b > 0 {
            assert!(!is_in_rollout(id, &version, b));
        }
    }
}
