use std::path::Path;

use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::locator::BinaryDescriptor;
use super::{BinaryError, Result};

/// Download progress reported to the caller while streaming a binary.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub percentage: f64,
}

/// Boundary adapter retrieving a located firmware binary over HTTP. The core
/// only ever produces [`BinaryDescriptor`]s; this is the one place network
/// transfer happens.
pub struct BinaryFetcher {
    client: Client,
}

impl BinaryFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Stream the descriptor's binary to `output_path`, reporting progress.
    pub async fn download<F>(
        &self,
        descriptor: &BinaryDescriptor,
        output_path: &Path,
        progress_callback: F,
    ) -> Result<u64>
    where
        F: Fn(DownloadProgress) + Send + Sync,
    {
        log::info!("Downloading firmware from: {}", descriptor.url);

        let response = self.client.get(&descriptor.url).send().await?;
        if !response.status().is_success() {
            log::error!("Download request failed with status: {}", response.status());
            return Err(BinaryError::Network(
                response.error_for_status().unwrap_err(),
            ));
        }

        let total_size = response.content_length().unwrap_or(0);
        let mut file = File::create(output_path).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = futures_util::StreamExt::next(&mut stream).await {
            let chunk = chunk_result.map_err(BinaryError::Network)?;
            file.write_all(&chunk).await?;

            downloaded += chunk.len() as u64;
            progress_callback(DownloadProgress {
                downloaded_bytes: downloaded,
                total_bytes: total_size,
                percentage: if total_size > 0 {
                    (downloaded as f64 / total_size as f64) * 100.0
                } else {
                    0.0
                },
            });
        }

        file.flush().await?;
        log::info!("Firmware download completed: {} bytes", downloaded);
        Ok(downloaded)
    }

    /// Verify a downloaded binary against the catalog's SHA-256 fingerprint.
    /// A release without a fingerprint passes with a debug note.
    pub async fn verify(&self, file_path: &Path, fingerprint: Option<&str>) -> Result<()> {
        let Some(expected) = fingerprint else {
            log::debug!("No fingerprint published, skipping verification");
            return Ok(());
        };

        let mut file = File::open(file_path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 8192];

        loop {
            let bytes_read = file.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        let computed = hex::encode(hasher.finalize());
        let expected = expected.to_lowercase();
        if computed == expected {
            log::info!("Firmware fingerprint verified: {}", computed);
            Ok(())
        } else {
            log::error!(
                "Firmware fingerprint mismatch - expected: {}, computed: {}",
                expected,
                computed
            );
            Err(BinaryError::FingerprintMismatch { expected, computed })
        }
    }
}

impl Default for BinaryFetcher {
    fn default() -> Self {
        Self::new()
    }
}
