//! API request handlers.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use gateway_shared_types::{validate_name, DeploymentSummary, DeviceDeployment, GatewayError, RepoImage};
use registry_client::first_tag_images;

use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;

/// Name reported by the version endpoint.
pub const GATEWAY_NAME: &str = "APIGW";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response of `/api`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Date")]
    pub date: String,
}

/// Envelope shared by the other endpoints. `message` holds the result as
/// text; list endpoints add the structured items alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse<T = ()> {
    pub message: String,
    #[serde(flatten)]
    pub items: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentList {
    pub deployments: Vec<DeploymentSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageList {
    pub images: Vec<RepoImage>,
}

/// Query of `/create`. Missing parameters read as empty and fail validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateQuery {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub reg: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub ec: String,
}

impl From<CreateQuery> for DeviceDeployment {
    fn from(query: CreateQuery) -> Self {
        DeviceDeployment {
            id: query.id,
            registry: query.reg,
            device: query.device,
            key_material: query.ec,
        }
    }
}

/// Query of `/delete`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub id: String,
}

/// Malformed query strings (repeated keys, bad encoding) are parameter errors.
fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::validation_error(rejection.body_text()))
}

fn to_json_text<T: Serialize>(value: &T) -> ApiResult<String> {
    serde_json::to_string(value).map_err(|e| ApiError::from(GatewayError::Upstream(e.to_string())))
}

async fn read_version(state: &ApiState) -> ApiResult<String> {
    let path = state.version_file.as_path();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| GatewayError::Io(format!("open {}: {}", path.display(), e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// ============================================================================
// Version Handler
// ============================================================================

/// Report the gateway name, the version file contents and the current time.
pub async fn get_version(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let version = read_version(&state).await?;
    info!("Version requested");

    Ok(Json(VersionResponse {
        name: GATEWAY_NAME.to_string(),
        version,
        date: chrono::Local::now().to_string(),
    }))
}

// ============================================================================
// Registry Handler
// ============================================================================

/// List registry repositories matching the prefix, one tag each.
pub async fn list_repo_images(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    // Unreadable version file means a misdeployed gateway; refuse to serve.
    read_version(&state).await?;

    let images = first_tag_images(state.registry.as_ref(), &state.repository_prefix).await?;
    info!(count = images.len(), prefix = %state.repository_prefix, "Repository images listed");

    Ok(Json(MessageResponse {
        message: to_json_text(&images)?,
        items: Some(ImageList { images }),
    }))
}

// ============================================================================
// Deployment Handlers
// ============================================================================

/// List deployments with their desired replica counts.
pub async fn list_deployments(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let deployments = state.deployments.list().await?;
    info!(count = deployments.len(), "Deployments listed");

    let list = DeploymentList { deployments };
    Ok(Json(MessageResponse {
        message: to_json_text(&list)?,
        items: Some(list),
    }))
}

/// Create a single-replica device deployment.
pub async fn create_deployment(
    State(state): State<ApiState>,
    query: Result<Query<CreateQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let device: DeviceDeployment = query_params(query)?.into();
    info!(id = %device.id, reg = %device.registry, device = %device.device, "Create requested");

    device.validate()?;
    let name = state.deployments.create(&device).await?;
    info!(deployment = %name, "Deployment created");

    Ok(Json(MessageResponse::<()> {
        message: format!("{:?}\n", name),
        items: None,
    }))
}

/// Delete a device deployment; dependents are removed first.
pub async fn delete_deployment(
    State(state): State<ApiState>,
    query: Result<Query<DeleteQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let query = query_params(query)?;
    info!(id = %query.id, "Delete requested");

    validate_name(&query.id)?;
    state.deployments.delete(&query.id).await?;
    info!(deployment = %query.id, "Deployment deleted");

    Ok(Json(MessageResponse::<()> {
        message: query.id,
        items: None,
    }))
}

// ============================================================================
// Fallbacks
// ============================================================================

/// Answer CORS preflight requests.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Unknown route, or a known route with an unsupported method.
pub async fn not_found() -> ApiError {
    ApiError::not_found("404 page not found")
}
