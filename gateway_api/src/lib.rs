// IoT Device API Gateway Library
//
// HTTP front for a device fleet: reports the gateway version, lists device
// images held in a container registry, and creates, lists and deletes the
// per-device Deployments running in a Kubernetes cluster.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{ConfigError, ErrorStatusPolicy, GatewayConfig};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use server::{ApiServer, Shutdown};
pub use state::ApiState;
