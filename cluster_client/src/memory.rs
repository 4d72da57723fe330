//! In-memory deployment backend for tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use tokio::sync::RwLock;

use gateway_shared_types::{DeploymentSummary, DeviceDeployment, GatewayError, Result};

use crate::descriptor::{build_deployment, DeviceTemplate};
use crate::DeploymentBackend;

/// Keeps deployments in a map, with the same error texts the API server
/// returns for name collisions and missing objects.
#[derive(Default)]
pub struct InMemoryDeployments {
    template: DeviceTemplate,
    deployments: RwLock<BTreeMap<String, Deployment>>,
    failure: RwLock<Option<GatewayError>>,
}

impl InMemoryDeployments {
    pub fn new(template: DeviceTemplate) -> Self {
        Self {
            template,
            ..Default::default()
        }
    }

    /// Store a deployment as-is, bypassing the descriptor builder.
    pub async fn insert(&self, deployment: Deployment) {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        self.deployments.write().await.insert(name, deployment);
    }

    /// Fetch a stored deployment.
    pub async fn get(&self, name: &str) -> Option<Deployment> {
        self.deployments.read().await.get(name).cloned()
    }

    /// Make every following call fail with `error` until cleared with `None`.
    pub async fn fail_with(&self, error: Option<GatewayError>) {
        *self.failure.write().await = error;
    }

    async fn check_failure(&self) -> Result<()> {
        match self.failure.read().await.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeploymentBackend for InMemoryDeployments {
    async fn create(&self, device: &DeviceDeployment) -> Result<String> {
        self.check_failure().await?;

        let mut deployments = self.deployments.write().await;
        if deployments.contains_key(&device.id) {
            return Err(GatewayError::Conflict(format!(
                "deployments.apps \"{}\" already exists",
                device.id
            )));
        }
        deployments.insert(device.id.clone(), build_deployment(&self.template, device));
        Ok(device.id.clone())
    }

    async fn list(&self) -> Result<Vec<DeploymentSummary>> {
        self.check_failure().await?;

        Ok(self
            .deployments
            .read()
            .await
            .iter()
            .map(|(name, d)| DeploymentSummary {
                name: name.clone(),
                replicas: d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
            })
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.check_failure().await?;

        match self.deployments.write().await.remove(name) {
            Some(_) => Ok(()),
            None => Err(GatewayError::NotFound(format!(
                "deployments.apps \"{}\" not found",
                name
            ))),
        }
    }
}
