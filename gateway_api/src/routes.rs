//! Router assembly: endpoints, CORS headers, error status policy, tracing.

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::ErrorStatusPolicy;
use crate::error::{ApiError, ErrorKind};
use crate::handlers;
use crate::state::ApiState;

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_CREDENTIALS: &str = "true";
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, \
Authorization, accept, origin, Cache-Control, X-Requested-With";
pub const CORS_ALLOW_METHODS: &str = "POST, OPTIONS, GET, PUT";

/// Build the gateway router.
pub fn create_router(state: ApiState) -> Router {
    let policy = state.error_status;

    let router = Router::new()
        .route("/api", endpoint(get(handlers::get_version)))
        .route("/repoimages", endpoint(get(handlers::list_repo_images)))
        .route("/list", endpoint(get(handlers::list_deployments)))
        .route("/create", endpoint(get(handlers::create_deployment)))
        .route("/delete", endpoint(get(handlers::delete_deployment)))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(middleware::map_response_with_state(policy, apply_error_status));

    with_cors_headers(router).layer(TraceLayer::new_for_http())
}

/// Add preflight handling; any other method is answered like an unknown path.
fn endpoint(route: MethodRouter<ApiState>) -> MethodRouter<ApiState> {
    route.options(handlers::preflight).fallback(handlers::not_found)
}

/// Attach the permissive CORS headers to every response, errors included.
///
/// `tower_http::cors::CorsLayer` refuses credentials together with a
/// wildcard origin, so the headers are set directly.
fn with_cors_headers(router: Router) -> Router {
    let headers: [(HeaderName, &'static str); 4] = [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, CORS_ALLOW_ORIGIN),
        (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, CORS_ALLOW_CREDENTIALS),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, CORS_ALLOW_HEADERS),
        (header::ACCESS_CONTROL_ALLOW_METHODS, CORS_ALLOW_METHODS),
    ];

    headers.into_iter().fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::overriding(
            name,
            HeaderValue::from_static(value),
        ))
    })
}

/// Largest error body carried over when a framework error is rewritten.
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Under the legacy policy every error response becomes a 404 with an
/// `Error: <text>` body, including errors produced outside the handlers.
async fn apply_error_status(State(policy): State<ErrorStatusPolicy>, mut response: Response) -> Response {
    if policy != ErrorStatusPolicy::Legacy {
        return response;
    }
    if response.extensions().get::<ErrorKind>().is_some() {
        *response.status_mut() = StatusCode::NOT_FOUND;
        return response;
    }

    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }
    let text = match axum::body::to_bytes(response.into_body(), MAX_ERROR_BODY).await {
        Ok(bytes) if !bytes.is_empty() => String::from_utf8_lossy(&bytes).trim().to_string(),
        _ => status.to_string(),
    };
    ApiError::not_found(text).into_response()
}
