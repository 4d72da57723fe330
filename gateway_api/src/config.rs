//! Gateway configuration.
//!
//! Every field has a default, so an absent or partial `apigw.toml` is valid.
//! Command-line flags and their environment variables override the file.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use cluster_client::{DeviceTemplate, KubeSettings};
use observability::LogFormat;
use registry_client::RegistrySettings;

/// Default configuration file, read only if present.
pub const DEFAULT_CONFIG_FILE: &str = "apigw.toml";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Status codes used for error responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatusPolicy {
    /// Every error is a 404, whatever its cause.
    #[default]
    Legacy,
    /// Status follows the error category (400, 409, 503, ...).
    Typed,
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to.
    pub listen: SocketAddr,
    /// File whose contents are reported as the gateway version.
    pub version_file: PathBuf,
    /// Cluster credentials.
    pub kubeconfig: PathBuf,
    /// Namespace of the device deployments.
    pub namespace: String,
    /// Upper bound on every registry and cluster call.
    pub request_timeout_secs: u64,
    pub error_status: ErrorStatusPolicy,
    pub log_format: LogFormat,
    pub registry: RegistryConfig,
    pub deployment: DeploymentConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Only repositories whose name starts with this are listed.
    pub repository_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploymentConfig {
    pub image: String,
    pub project: String,
    pub location: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080),
            version_file: PathBuf::from("uuid.txt"),
            kubeconfig: PathBuf::from("kubeconfig"),
            namespace: "default".to_string(),
            request_timeout_secs: 30,
            error_status: ErrorStatusPolicy::default(),
            log_format: LogFormat::default(),
            registry: RegistryConfig::default(),
            deployment: DeploymentConfig::default(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let settings = RegistrySettings::default();
        Self {
            url: settings.url,
            username: None,
            password: None,
            repository_prefix: "iotd".to_string(),
        }
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        let template = DeviceTemplate::default();
        Self {
            image: template.image,
            project: template.project,
            location: template.location,
        }
    }
}

impl GatewayConfig {
    /// Load from `path`. An explicitly given file must exist; without one,
    /// `apigw.toml` is used if present and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be greater than 0".to_string()));
        }
        if self.namespace.is_empty() {
            return Err(ConfigError::Invalid("namespace must not be empty".to_string()));
        }
        if self.registry.repository_prefix.is_empty() {
            return Err(ConfigError::Invalid("registry.repository_prefix must not be empty".to_string()));
        }
        if self.deployment.image.is_empty() {
            return Err(ConfigError::Invalid("deployment.image must not be empty".to_string()));
        }
        if self.registry.password.is_some() && self.registry.username.is_none() {
            return Err(ConfigError::Invalid("registry.password requires registry.username".to_string()));
        }
        registry_client::HttpRegistry::new(self.registry_settings())
            .map_err(|e| ConfigError::Invalid(format!("registry.url: {}", e)))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            url: self.registry.url.clone(),
            username: self.registry.username.clone(),
            password: self.registry.password.clone(),
            timeout: self.request_timeout(),
        }
    }

    pub fn kube_settings(&self) -> KubeSettings {
        KubeSettings {
            kubeconfig: self.kubeconfig.clone(),
            namespace: self.namespace.clone(),
            timeout: self.request_timeout(),
        }
    }

    pub fn device_template(&self) -> DeviceTemplate {
        DeviceTemplate {
            image: self.deployment.image.clone(),
            project: self.deployment.project.clone(),
            location: self.deployment.location.clone(),
        }
    }
}
