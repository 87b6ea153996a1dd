pub mod fetch;
pub mod locator;

pub use fetch::{BinaryFetcher, DownloadProgress};
pub use locator::{locate, BinaryDescriptor, ImageKind};

#[derive(Debug, thiserror::Error)]
pub enum BinaryError {
    #[error("No binary at composed location: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fingerprint mismatch - expected {expected}, computed {computed}")]
    FingerprintMismatch { expected: String, computed: String },
}

pub type Result<T> = std::result::Result<T, BinaryError>;
