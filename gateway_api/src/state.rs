//! API server state.

use std::path::PathBuf;
use std::sync::Arc;

use cluster_client::{DeploymentBackend, KubeDeployments};
use gateway_shared_types::GatewayError;
use registry_client::{HttpRegistry, ImageRegistry};

use crate::config::{ErrorStatusPolicy, GatewayConfig};

/// Shared state for the API server.
#[derive(Clone)]
pub struct ApiState {
    /// Device deployments in the cluster.
    pub deployments: Arc<dyn DeploymentBackend>,
    /// Registry queried for device images.
    pub registry: Arc<dyn ImageRegistry>,
    /// File reported by the version endpoint, read on every request.
    pub version_file: Arc<PathBuf>,
    /// Prefix selecting the listed repositories.
    pub repository_prefix: Arc<str>,
    /// How error responses choose their status code.
    pub error_status: ErrorStatusPolicy,
}

impl ApiState {
    /// Create new API state.
    pub fn new(
        deployments: Arc<dyn DeploymentBackend>,
        registry: Arc<dyn ImageRegistry>,
        version_file: PathBuf,
        repository_prefix: &str,
        error_status: ErrorStatusPolicy,
    ) -> Self {
        Self {
            deployments,
            registry,
            version_file: Arc::new(version_file),
            repository_prefix: Arc::from(repository_prefix),
            error_status,
        }
    }

    /// Wire up the Kubernetes and registry clients described by `config`.
    ///
    /// Nothing is contacted here; the cluster client is built on first use.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let deployments = KubeDeployments::new(config.kube_settings(), config.device_template());
        let registry = HttpRegistry::new(config.registry_settings())?;

        Ok(Self::new(
            Arc::new(deployments),
            Arc::new(registry),
            config.version_file.clone(),
            &config.registry.repository_prefix,
            config.error_status,
        ))
    }
}
