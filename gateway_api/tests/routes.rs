//! End-to-end router tests against in-memory backends.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use cluster_client::{DeploymentBackend, InMemoryDeployments};
use gateway_api::{create_router, ApiState, ErrorStatusPolicy};
use gateway_shared_types::GatewayError;
use registry_client::{ImageRegistry, RegistryError};

struct StaticRegistry {
    repositories: Vec<String>,
    reachable: bool,
}

#[async_trait]
impl ImageRegistry for StaticRegistry {
    async fn repositories(&self) -> registry_client::Result<Vec<String>> {
        if !self.reachable {
            return Err(RegistryError::Status {
                url: "http://registry/v2/_catalog".to_string(),
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self.repositories.clone())
    }

    async fn tags(&self, repository: &str) -> registry_client::Result<Vec<String>> {
        Ok(vec![format!("{}-v1", repository), "latest".to_string()])
    }

    async fn architecture(&self, _repository: &str, _tag: &str) -> registry_client::Result<String> {
        Ok("arm".to_string())
    }
}

struct Harness {
    router: Router,
    deployments: Arc<InMemoryDeployments>,
    version_file: PathBuf,
    _dir: TempDir,
}

fn harness_with(policy: ErrorStatusPolicy, registry: StaticRegistry) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let version_file = dir.path().join("uuid.txt");
    std::fs::write(&version_file, "0f8c2a7e-version-1").unwrap();

    let deployments = Arc::new(InMemoryDeployments::default());
    let state = ApiState::new(
        deployments.clone(),
        Arc::new(registry),
        version_file.clone(),
        "iotd",
        policy,
    );

    Harness {
        router: create_router(state),
        deployments,
        version_file,
        _dir: dir,
    }
}

fn harness(policy: ErrorStatusPolicy) -> Harness {
    harness_with(
        policy,
        StaticRegistry {
            repositories: ["io", "iotd", "base", "iotd-sensor", "xiotd"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reachable: true,
        },
    )
}

async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, HeaderMap, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn get(router: &Router, uri: &str) -> (StatusCode, HeaderMap, String) {
    send(router, Method::GET, uri).await
}

fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

fn assert_cors(headers: &HeaderMap) {
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-credentials"], "true");
    assert_eq!(
        headers["access-control-allow-headers"],
        "Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization, accept, origin, Cache-Control, X-Requested-With"
    );
    assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS, GET, PUT");
}

fn seeded(name: &str, replicas: i32) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn create_then_delete_leaves_no_deployment() {
    let h = harness(ErrorStatusPolicy::Legacy);

    let (status, headers, body) = get(&h.router, "/create?id=dev-1&reg=factory&device=sensor1&ec=MHcCAQEE").await;
    assert_eq!(status, StatusCode::OK);
    assert_cors(&headers);
    assert_eq!(json(&body)["message"], "\"dev-1\"\n");

    let (_, _, body) = get(&h.router, "/list").await;
    let listed = json(&body);
    assert_eq!(listed["deployments"], serde_json::json!([{"name": "dev-1", "replicas": 1}]));

    let (status, _, body) = get(&h.router, "/delete?id=dev-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["message"], "dev-1");

    assert!(h.deployments.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_create_fails_and_keeps_replicas() {
    let h = harness(ErrorStatusPolicy::Legacy);
    h.deployments.insert(seeded("dev-1", 3)).await;

    let (status, headers, body) = get(&h.router, "/create?id=dev-1&reg=factory&device=sensor1&ec=key").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_cors(&headers);
    assert_eq!(body, "Error: deployments.apps \"dev-1\" already exists");

    let stored = h.deployments.get("dev-1").await.unwrap();
    assert_eq!(stored.spec.unwrap().replicas, Some(3));
}

#[tokio::test]
async fn delete_missing_is_error() {
    let h = harness(ErrorStatusPolicy::Legacy);

    let (status, headers, body) = get(&h.router, "/delete?id=ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_cors(&headers);
    assert_eq!(body, "Error: deployments.apps \"ghost\" not found");
}

#[tokio::test]
async fn version_reflects_file_on_every_call() {
    let h = harness(ErrorStatusPolicy::Legacy);

    let (status, headers, body) = get(&h.router, "/api").await;
    assert_eq!(status, StatusCode::OK);
    assert_cors(&headers);
    let first = json(&body);
    assert_eq!(first["Name"], "APIGW");
    assert_eq!(first["Version"], "0f8c2a7e-version-1");
    assert!(first["Date"].as_str().is_some_and(|d| !d.is_empty()));

    std::fs::write(&h.version_file, "0f8c2a7e-version-2\n").unwrap();
    let (_, _, body) = get(&h.router, "/api").await;
    assert_eq!(json(&body)["Version"], "0f8c2a7e-version-2\n");
}

#[tokio::test]
async fn missing_version_file_is_error() {
    let h = harness(ErrorStatusPolicy::Legacy);
    std::fs::remove_file(&h.version_file).unwrap();

    let (status, headers, body) = get(&h.router, "/api").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_cors(&headers);
    assert!(body.starts_with("Error: open "), "unexpected body: {body}");

    let (status, _, _) = get(&h.router, "/repoimages").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn repo_images_only_lists_prefixed_repositories() {
    let h = harness(ErrorStatusPolicy::Legacy);

    let (status, headers, body) = get(&h.router, "/repoimages").await;
    assert_eq!(status, StatusCode::OK);
    assert_cors(&headers);

    let value = json(&body);
    let expected = serde_json::json!([
        {"id": "1", "name": "iotd", "tag": "iotd-v1", "arch": "arm"},
        {"id": "3", "name": "iotd-sensor", "tag": "iotd-sensor-v1", "arch": "arm"}
    ]);
    assert_eq!(value["images"], expected);

    let message: Value = serde_json::from_str(value["message"].as_str().unwrap()).unwrap();
    assert_eq!(message, expected);
}

#[tokio::test]
async fn unreachable_registry_is_error() {
    let h = harness_with(
        ErrorStatusPolicy::Typed,
        StaticRegistry {
            repositories: Vec::new(),
            reachable: false,
        },
    );

    let (status, headers, body) = get(&h.router, "/repoimages").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_cors(&headers);
    assert!(body.starts_with("Error: registry returned 503"));
}

#[tokio::test]
async fn invalid_parameters_never_reach_the_cluster() {
    let h = harness(ErrorStatusPolicy::Legacy);

    for uri in [
        "/create",
        "/create?id=Dev_1&reg=factory&device=sensor1&ec=key",
        "/create?id=dev-1&reg=factory&device=sensor1%3B%20reboot&ec=key",
        "/create?id=dev-1&reg=%24(id)&device=sensor1&ec=key",
        "/create?id=dev-1&reg=factory&device=sensor1",
        "/delete",
        "/delete?id=-bad",
    ] {
        let (status, headers, body) = get(&h.router, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_cors(&headers);
        assert!(body.starts_with("Error: invalid parameter"), "{uri}: {body}");
    }

    assert!(h.deployments.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn key_material_stays_out_of_the_command() {
    let h = harness(ErrorStatusPolicy::Legacy);

    let (status, _, _) = get(&h.router, "/create?id=dev-2&reg=factory&device=sensor2&ec=abc%22%3B%20rm%20-rf%20%2F").await;
    assert_eq!(status, StatusCode::OK);

    let stored = h.deployments.get("dev-2").await.unwrap();
    let container = &stored.spec.unwrap().template.spec.unwrap().containers[0];
    let command = container.command.clone().unwrap();
    assert!(command.iter().all(|part| !part.contains("rm -rf")));

    let ec = container
        .env
        .as_ref()
        .unwrap()
        .iter()
        .find(|e| e.name == "EC")
        .and_then(|e| e.value.clone());
    assert_eq!(ec.as_deref(), Some("abc\"; rm -rf /"));
}

#[tokio::test]
async fn typed_policy_reports_error_categories() {
    let h = harness(ErrorStatusPolicy::Typed);
    h.deployments.insert(seeded("dev-1", 1)).await;

    let (status, _, _) = get(&h.router, "/create?id=dev-1&reg=factory&device=sensor1&ec=key").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, _) = get(&h.router, "/delete?id=BAD").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(&h.router, "/delete?id=ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.deployments
        .fail_with(Some(GatewayError::Unavailable("connection refused".to_string())))
        .await;
    let (status, headers, body) = get(&h.router, "/list").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_cors(&headers);
    assert_eq!(body, "Error: connection refused");
}

#[tokio::test]
async fn legacy_policy_folds_everything_into_404() {
    let h = harness(ErrorStatusPolicy::Legacy);
    h.deployments
        .fail_with(Some(GatewayError::Unavailable("connection refused".to_string())))
        .await;

    let (status, headers, body) = get(&h.router, "/list").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_cors(&headers);
    assert_eq!(body, "Error: connection refused");
}

#[tokio::test]
async fn cors_on_unknown_routes_and_preflight() {
    let h = harness(ErrorStatusPolicy::Legacy);

    let (status, headers, _) = get(&h.router, "/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_cors(&headers);

    let (status, headers, _) = send(&h.router, Method::OPTIONS, "/create").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_cors(&headers);
}

#[tokio::test]
async fn list_message_is_json_text() {
    let h = harness(ErrorStatusPolicy::Legacy);
    h.deployments.insert(seeded("alpha", 2)).await;

    let (status, _, body) = get(&h.router, "/list").await;
    assert_eq!(status, StatusCode::OK);

    let value = json(&body);
    let message: Value = serde_json::from_str(value["message"].as_str().unwrap()).unwrap();
    assert_eq!(message, serde_json::json!({"deployments": [{"name": "alpha", "replicas": 2}]}));
}

#[tokio::test]
async fn malformed_query_is_a_legacy_404() {
    let h = harness(ErrorStatusPolicy::Legacy);

    for uri in [
        "/delete?id=a&id=b",
        "/create?id=dev-1&id=dev-2&reg=factory&device=sensor1&ec=key",
    ] {
        let (status, headers, body) = get(&h.router, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_cors(&headers);
        assert!(body.starts_with("Error: invalid parameter: "), "{uri}: {body}");
        assert!(body.contains("duplicate field"), "{uri}: {body}");
    }

    assert!(h.deployments.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_query_is_a_typed_400() {
    let h = harness(ErrorStatusPolicy::Typed);

    let (status, headers, body) = get(&h.router, "/delete?id=a&id=b").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_cors(&headers);
    assert!(body.starts_with("Error: invalid parameter: "), "{body}");
}

#[tokio::test]
async fn unsupported_method_is_answered_like_an_unknown_path() {
    for policy in [ErrorStatusPolicy::Legacy, ErrorStatusPolicy::Typed] {
        let h = harness(policy);

        let (status, headers, body) =
            send(&h.router, Method::POST, "/create?id=dev-1&reg=factory&device=sensor1&ec=key").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_cors(&headers);
        assert_eq!(body, "Error: 404 page not found");

        let (status, _, body) = send(&h.router, Method::DELETE, "/delete?id=dev-1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Error: 404 page not found");

        assert!(h.deployments.list().await.unwrap().is_empty());
    }
}
