pub mod client;
pub mod models;

pub use client::CatalogClient;
pub use models::{Channel, ChannelPolicy, Release, ReleaseCatalog};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
