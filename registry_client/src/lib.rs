//! Registry queries for the gateway's image listing.
//!
//! - `http`: `HttpRegistry`, a Docker Registry HTTP API v2 client
//! - `manifest`: manifest documents and how each one names its architecture
//! - `images`: the "first tag per matching repository" listing

pub mod http;
pub mod images;
pub mod manifest;

use async_trait::async_trait;

use gateway_shared_types::GatewayError;

pub use http::{HttpRegistry, RegistrySettings};
pub use images::first_tag_images;

/// Errors specific to registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry returned {status} for {url}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("invalid registry URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("malformed registry response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("manifest for {0} does not name an architecture")]
    MissingArchitecture(String),
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        let message = err.to_string();
        match err {
            RegistryError::Http(e) if e.is_timeout() => GatewayError::Timeout(message),
            RegistryError::Http(e) if e.is_connect() => GatewayError::Unavailable(message),
            RegistryError::Status { status: 401 | 403, .. } => GatewayError::Unauthorized(message),
            RegistryError::Status { status: 404, .. } => GatewayError::NotFound(message),
            RegistryError::Status { status: 503, .. } => GatewayError::Unavailable(message),
            RegistryError::InvalidUrl(_) => GatewayError::Config(message),
            _ => GatewayError::Upstream(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Read-only view of an image registry.
#[async_trait]
pub trait ImageRegistry: Send + Sync {
    /// Every repository name in the catalog, in registry order.
    async fn repositories(&self) -> Result<Vec<String>>;

    /// Every tag of `repository`, in registry order.
    async fn tags(&self, repository: &str) -> Result<Vec<String>>;

    /// CPU architecture of the image `repository:tag`.
    async fn architecture(&self, repository: &str, tag: &str) -> Result<String>;
}
