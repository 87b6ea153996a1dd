use reqwest::Client;

use crate::device::DeviceFamily;

use super::models::{Release, ReleaseCatalog};
use super::{CatalogError, Result};

/// Fetches per-family `releases.json` documents from the release server.
pub struct CatalogClient {
    client: Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn releases_url(&self, family: DeviceFamily) -> String {
        format!(
            "{}/firmware/{}/releases.json",
            self.base_url.trim_end_matches('/'),
            family.slug()
        )
    }

    /// Fetch the release list for one device family, newest first.
    pub async fn fetch_releases(&self, family: DeviceFamily) -> Result<Vec<Release>> {
        let url = self.releases_url(family);
        log::debug!("Fetching release catalog from: {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("User-Agent", "keylink-firmware/0.1")
            .send()
            .await?;

        if !response.status().is_success() {
            log::error!("Catalog request failed with status: {}", response.status());
            return Err(CatalogError::Network(
                response.error_for_status().unwrap_err(),
            ));
        }

        let mut releases: Vec<Release> = response.json().await?;
        if releases.is_empty() {
            return Err(CatalogError::Parse(anyhow::anyhow!(
                "empty release list for {:?}",
                family
            )));
        }

        releases.sort_by(|a, b| b.version.cmp(&a.version));
        log::info!("Fetched {} releases for {:?}", releases.len(), family);
        Ok(releases)
    }

    /// Fetch catalogs for several families into one `ReleaseCatalog`.
    pub async fn fetch_catalog(&self, families: &[DeviceFamily]) -> Result<ReleaseCatalog> {
        let mut catalog = ReleaseCatalog::new();
        for family in families {
            let releases = self.fetch_releases(*family).await?;
            catalog.insert_family(*family, releases);
        }
        Ok(catalog)
    }
}
