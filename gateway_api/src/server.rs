//! HTTP server lifecycle.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use gateway_shared_types::GatewayError;

use crate::config::GatewayConfig;
use crate::routes::create_router;
use crate::state::ApiState;

/// The gateway's HTTP server.
pub struct ApiServer {
    listen: SocketAddr,
    state: ApiState,
}

impl ApiServer {
    /// Build the server from configuration. No external system is contacted.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Ok(Self::with_state(config.listen, ApiState::from_config(config)?))
    }

    pub fn with_state(listen: SocketAddr, state: ApiState) -> Self {
        Self { listen, state }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Serve until a stop signal arrives.
    pub async fn run_until_signalled(self) -> std::io::Result<()> {
        self.run(async {
            let reason = Shutdown::requested().await;
            info!(?reason, "Shutting down, draining in-flight requests");
        })
        .await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.listen).await?;
        info!(address = %listener.local_addr()?, "APIGW running");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

/// Why the process was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Interrupt,
    Terminate,
}

impl Shutdown {
    /// Wait for the first stop request. A signal whose handler cannot be
    /// installed is logged and never fires.
    pub async fn requested() -> Self {
        tokio::select! {
            reason = interrupt() => reason,
            reason = terminate() => reason,
        }
    }
}

async fn interrupt() -> Shutdown {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for Ctrl+C");
        return std::future::pending().await;
    }
    Shutdown::Interrupt
}

#[cfg(unix)]
async fn terminate() -> Shutdown {
    let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "Cannot listen for SIGTERM");
            return std::future::pending().await;
        }
    };
    sigterm.recv().await;
    Shutdown::Terminate
}

#[cfg(not(unix))]
async fn terminate() -> Shutdown {
    std::future::pending().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cluster_client::InMemoryDeployments;
    use registry_client::{HttpRegistry, RegistrySettings};

    use crate::config::ErrorStatusPolicy;

    #[tokio::test]
    async fn test_run_returns_once_shutdown_resolves() {
        let registry = HttpRegistry::new(RegistrySettings::default()).unwrap();
        let state = ApiState::new(
            Arc::new(InMemoryDeployments::default()),
            Arc::new(registry),
            "uuid.txt".into(),
            "iotd",
            ErrorStatusPolicy::Legacy,
        );
        let server = ApiServer::with_state("127.0.0.1:0".parse().unwrap(), state);

        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(server.run(async move {
            let _ = stopped.await;
        }));

        stop.send(()).unwrap();
        running.await.unwrap().unwrap();
    }
}
