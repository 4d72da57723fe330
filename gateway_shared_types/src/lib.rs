//! Types shared between the gateway's cluster client, registry client and
//! HTTP layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a Kubernetes object name that is also used as a label
/// value and container name.
pub const MAX_NAME_LEN: usize = 63;

/// Replica count of every device deployment.
pub const DEVICE_REPLICAS: i32 = 1;

/// Errors surfaced by any part of the gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("invalid parameter: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Io(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Upstream(String),
}

impl GatewayError {
    /// Stable, machine-readable category of the error.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized(_) => "unauthorized",
            Self::Unavailable(_) => "unavailable",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::Upstream(_) => "upstream",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Parameters of a device client deployment, one per device.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceDeployment {
    /// Deployment, label, and container name.
    pub id: String,
    /// Device registry the client connects through.
    pub registry: String,
    /// Device id within the registry.
    pub device: String,
    /// EC private key body, without the PEM armour lines.
    pub key_material: String,
}

// Key material must never end up in logs.
impl fmt::Debug for DeviceDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceDeployment")
            .field("id", &self.id)
            .field("registry", &self.registry)
            .field("device", &self.device)
            .field("key_material", &"<redacted>")
            .finish()
    }
}

impl DeviceDeployment {
    /// Check every parameter before it reaches the cluster.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.id)?;
        validate_device_token("reg", &self.registry)?;
        validate_device_token("device", &self.device)?;
        if self.key_material.trim().is_empty() {
            return Err(GatewayError::Validation("ec must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Validate an RFC 1123 DNS label, the rule Kubernetes applies to names
/// that double as label values.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(GatewayError::Validation("id must not be empty".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(GatewayError::Validation(format!(
            "id must be at most {} characters, got {}",
            MAX_NAME_LEN,
            name.len()
        )));
    }

    let valid_chars = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    let bytes = name.as_bytes();
    let alnum_edges = bytes[0].is_ascii_alphanumeric() && bytes[bytes.len() - 1].is_ascii_alphanumeric();

    if !valid_chars || !alnum_edges {
        return Err(GatewayError::Validation(format!(
            "id '{}' must consist of lower case alphanumeric characters or '-', \
             and must start and end with an alphanumeric character",
            name
        )));
    }
    Ok(())
}

/// Registry and device ids: letters, digits and `._~+%-`.
pub fn validate_device_token(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(GatewayError::Validation(format!("{} must not be empty", field)));
    }
    let ok = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '~' | '+' | '%' | '-'));
    if !ok {
        return Err(GatewayError::Validation(format!(
            "{} '{}' contains characters outside [A-Za-z0-9._~+%-]",
            field, value
        )));
    }
    Ok(())
}

/// Name and desired replica count of a deployment in the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSummary {
    pub name: String,
    pub replicas: i32,
}

/// A registry repository together with its first tag and that tag's
/// architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoImage {
    /// Position of the repository in the full catalog listing.
    pub id: String,
    pub name: String,
    pub tag: Option<String>,
    pub arch: Option<String>,
}
