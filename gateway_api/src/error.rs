//! API error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use gateway_shared_types::GatewayError;
use registry_client::RegistryError;

/// Category of a failed request, attached to the response extensions so the
/// status policy layer can recognise error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorKind(pub &'static str);

/// Error returned by handlers. Rendered as `Error: <message>`.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] GatewayError);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation_error(message: impl Into<String>) -> Self {
        ApiError(GatewayError::Validation(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError(GatewayError::NotFound(message.into()))
    }

    /// Status code for the error's category.
    pub const fn status_code(&self) -> StatusCode {
        match &self.0 {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Io(_) | GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        warn!(kind, error = %self.0, "Request failed");

        let mut response = (self.status_code(), format!("Error: {}", self.0)).into_response();
        response.extensions_mut().insert(ErrorKind(kind));
        response
    }
}
