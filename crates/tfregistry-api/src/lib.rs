//! HTTP surface of the Terraform registry
//!
//! - **Handlers**: registry protocol endpoints and health
//! - **Transfer**: token-scoped upload and download of local assets
//! - **Routes**: router construction
//! - **Middleware**: request IDs, tracing, CORS
//! - **Error Handling**: service errors to HTTP responses
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tfregistry_api::{build_api_server, AppState};
//!
//! # async fn example(
//! #     backend: Arc<dyn tfregistry_db::Backend>,
//! #     storage: Arc<dyn tfregistry_storage::AssetBackend>,
//! # ) {
//! let app = build_api_server(AppState::new(backend, storage));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;
pub mod transfer;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{AppState, TERRAFORM_GET_HEADER};
pub use middleware::{CorsConfig, MiddlewareConfig, UuidRequestIdGenerator};
pub use responses::{ComponentHealth, HealthResponse, HealthStatus, UploadResponse};
pub use routes::{build_router, build_router_with_config, RouteConfig};

use axum::Router;
use std::time::Duration;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

/// Build the router with every middleware layer at its default setting
pub fn build_api_server(state: AppState) -> Router {
    build_api_server_with_config(state, MiddlewareConfig::default(), &RouteConfig::default())
}

pub fn build_api_server_with_config(
    state: AppState,
    middleware_config: MiddlewareConfig,
    route_config: &RouteConfig,
) -> Router {
    let state = state.with_request_timeout(Duration::from_secs(
        middleware_config.request_timeout_seconds,
    ));
    let mut router = build_router_with_config(state, route_config)
        .layer(middleware_config.cors.into_layer());

    if middleware_config.enable_tracing {
        router = router.layer(middleware::trace_layer());
    }

    router
        .layer(SetRequestIdLayer::x_request_id(UuidRequestIdGenerator))
        .layer(PropagateRequestIdLayer::x_request_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tfregistry_core::{CreatePolicy, RequestContext};
    use tfregistry_db::{EngineLifecycle, KeyValueBackend};
    use tfregistry_storage::{AssetPath, AssetStorage, LocalAssetStorage, TokenSigner, TransferOp};
    use tower::ServiceExt;

    async fn app() -> (TempDir, Arc<LocalAssetStorage>, Router) {
        let ctx = RequestContext::new();
        let backend = Arc::new(KeyValueBackend::memory(CreatePolicy::CreateOrGet));
        backend.configure(&ctx).await.unwrap();

        let dir = TempDir::new().unwrap();
        let signer = Arc::new(TokenSigner::new(b"api-test-secret").unwrap());
        let local =
            Arc::new(LocalAssetStorage::new(dir.path(), "http://registry.test", signer).unwrap());
        local.configure(&ctx).await.unwrap();

        let state = AppState::new(backend, local.clone()).with_local_storage(local.clone());
        (dir, local, build_api_server(state))
    }

    #[tokio::test]
    async fn test_health_reports_components() {
        let (_dir, _local, app) = app().await;

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["checks"]["backend"]["message"], "memory");
        assert_eq!(json["checks"]["storage"]["message"], "local");
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let (_dir, local, app) = app().await;
        let path = AssetPath::parse("providers/org1/private/acme/widget/1.0.0/a.zip").unwrap();
        let upload = local.signer().mint(TransferOp::Upload, &path).unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::put(format!("/asset/upload/{}", upload))
                    .body(Body::from("payload"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let download = local.signer().mint(TransferOp::Download, &path).unwrap();
        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/asset/download/{}/whatever.zip", download))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-length"], "7");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"payload");
    }

    #[tokio::test]
    async fn test_upload_token_cannot_download() {
        let (_dir, local, app) = app().await;
        let path = AssetPath::parse("providers/org1/private/acme/widget/1.0.0/a.zip").unwrap();
        let upload = local.signer().mint(TransferOp::Upload, &path).unwrap();

        let response = app
            .oneshot(
                Request::get(format!("/asset/download/{}/a.zip", upload))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_provider_is_not_found() {
        let (_dir, _local, app) = app().await;

        let response = app
            .oneshot(
                Request::get("/v1/providers/org1/acme/widget/versions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_well_known_document() {
        let (_dir, _local, app) = app().await;

        let response = app
            .oneshot(
                Request::get("/.well-known/terraform.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["providers.v1"], "/v1/providers/");
    }
}
