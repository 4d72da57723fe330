//! Device deployment lifecycle for the gateway.
//!
//! This crate provides implementations of the `DeploymentBackend` trait:
//! - `KubeDeployments`: `apps/v1` Deployments in one namespace, via kube-rs
//! - `InMemoryDeployments`: in-process store for tests (`mock-backend` feature)
//!
//! The `descriptor` module turns a `DeviceDeployment` into the Deployment
//! object both backends store.

pub mod descriptor;
pub mod kube_backend;

#[cfg(feature = "mock-backend")]
pub mod memory;

use async_trait::async_trait;

use gateway_shared_types::{DeploymentSummary, DeviceDeployment, Result};

pub use descriptor::{build_deployment, DeviceTemplate};
pub use kube_backend::{ClusterError, KubeDeployments, KubeSettings};

#[cfg(feature = "mock-backend")]
pub use memory::InMemoryDeployments;

/// Create, list and delete device deployments.
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// Submit a new deployment; returns the name the cluster assigned.
    ///
    /// Returns as soon as the write is accepted, without waiting for the
    /// pod to run.
    async fn create(&self, deployment: &DeviceDeployment) -> Result<String>;

    /// List every deployment in the namespace.
    async fn list(&self) -> Result<Vec<DeploymentSummary>>;

    /// Delete a deployment with foreground propagation.
    async fn delete(&self, name: &str) -> Result<()>;
}
