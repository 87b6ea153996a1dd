use semver::Version;

/// Build a version from the catalog's `[major, minor, patch]` shape.
pub fn from_triple(triple: [u64; 3]) -> Version {
    Version::new(triple[0], triple[1], triple[2])
}

/// Serde adapter for versions stored as three-element arrays in the
/// release catalog (`"version": [1, 6, 3]`).
pub mod triple {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(version: &Version, serializer: S) -> Result<S::Ok, S::Error> {
        [version.major, version.minor, version.patch].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Version, D::Error> {
        let parts = <[u64; 3]>::deserialize(deserializer)?;
        Ok(super::from_triple(parts))
    }
}

/// Same as [`triple`], for optional fields.
pub mod triple_opt {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        version: &Option<Version>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        version
            .as_ref()
            .map(|v| [v.major, v.minor, v.patch])
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Version>, D::Error> {
        let parts = Option::<[u64; 3]>::deserialize(deserializer)?;
        Ok(parts.map(super::from_triple))
    }
}
