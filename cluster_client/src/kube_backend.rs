//! Kubernetes-backed device deployments.
//!
//! The client is built from the kubeconfig file on first use and reused
//! afterwards. A failed build is not cached; the next call tries again.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Client, Config};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use gateway_shared_types::{DeploymentSummary, DeviceDeployment, GatewayError, Result};

use crate::descriptor::{build_deployment, DeviceTemplate};
use crate::DeploymentBackend;

/// Errors specific to talking to the cluster.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] KubeconfigError),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error("cluster call '{0}' did not complete in time")]
    Timeout(&'static str),
}

impl From<ClusterError> for GatewayError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Kubeconfig(e) => GatewayError::Config(e.to_string()),
            ClusterError::Timeout(op) => GatewayError::Timeout(format!("cluster {}", op)),
            ClusterError::Kube(kube::Error::Api(response)) => match response.code {
                400 | 422 => GatewayError::Validation(response.message),
                401 | 403 => GatewayError::Unauthorized(response.message),
                404 => GatewayError::NotFound(response.message),
                409 => GatewayError::Conflict(response.message),
                503 => GatewayError::Unavailable(response.message),
                _ => GatewayError::Upstream(response.message),
            },
            ClusterError::Kube(e @ (kube::Error::HyperError(_) | kube::Error::Service(_))) => {
                GatewayError::Unavailable(e.to_string())
            }
            ClusterError::Kube(e) => GatewayError::Upstream(e.to_string()),
        }
    }
}

/// Where and how to reach the cluster.
#[derive(Debug, Clone)]
pub struct KubeSettings {
    /// Path of the kubeconfig file.
    pub kubeconfig: PathBuf,
    /// Namespace holding the device deployments.
    pub namespace: String,
    /// Upper bound on every API call.
    pub timeout: Duration,
}

impl Default for KubeSettings {
    fn default() -> Self {
        Self {
            kubeconfig: PathBuf::from("kubeconfig"),
            namespace: "default".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Device deployments stored as `apps/v1` Deployments.
pub struct KubeDeployments {
    settings: KubeSettings,
    template: DeviceTemplate,
    client: OnceCell<Client>,
}

impl KubeDeployments {
    pub fn new(settings: KubeSettings, template: DeviceTemplate) -> Self {
        Self {
            settings,
            template,
            client: OnceCell::new(),
        }
    }

    async fn load_client(&self) -> std::result::Result<Client, ClusterError> {
        let kubeconfig = Kubeconfig::read_from(&self.settings.kubeconfig)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        let client = Client::try_from(config)?;
        info!(kubeconfig = %self.settings.kubeconfig.display(), "Cluster client ready");
        Ok(client)
    }

    async fn api(&self) -> std::result::Result<Api<Deployment>, ClusterError> {
        let client = self.client.get_or_try_init(|| self.load_client()).await?;
        Ok(Api::namespaced(client.clone(), &self.settings.namespace))
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> std::result::Result<T, ClusterError>
    where
        F: Future<Output = std::result::Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.settings.timeout, fut).await {
            Ok(result) => result.map_err(ClusterError::from),
            Err(_) => Err(ClusterError::Timeout(op)),
        }
    }
}

#[async_trait]
impl DeploymentBackend for KubeDeployments {
    async fn create(&self, device: &DeviceDeployment) -> Result<String> {
        let api = self.api().await?;
        let deployment = build_deployment(&self.template, device);

        let created = self
            .bounded("create", api.create(&PostParams::default(), &deployment))
            .await?;

        let name = created.metadata.name.unwrap_or_else(|| device.id.clone());
        debug!(deployment = %name, namespace = %self.settings.namespace, "Deployment created");
        Ok(name)
    }

    async fn list(&self) -> Result<Vec<DeploymentSummary>> {
        let api = self.api().await?;
        let list = self.bounded("list", api.list(&ListParams::default())).await?;

        Ok(list
            .items
            .into_iter()
            .map(|d| DeploymentSummary {
                name: d.metadata.name.unwrap_or_default(),
                // The API server defaults an unset count to 1.
                replicas: d.spec.and_then(|s| s.replicas).unwrap_or(1),
            })
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let api = self.api().await?;
        self.bounded("delete", api.delete(name, &DeleteParams::foreground()))
            .await?;

        debug!(deployment = %name, namespace = %self.settings.namespace, "Deployment deleted");
        Ok(())
    }
}
