//! Common test utilities and helpers
//!
//! Builds a registry over any in-process engine: the backend, a local asset
//! store under a temporary directory and the HTTP router in front of both.

#![allow(dead_code)]

use axum::Router;
use std::sync::Arc;
use tempfile::TempDir;
use tfregistry_api::{build_api_server, AppState};
use tfregistry_core::{CreatePolicy, RequestContext};
use tfregistry_db::{Backend, BackendRegistry, EngineConfig, EngineLifecycle};
use tfregistry_service::ServiceRegistry;
use tfregistry_storage::{AssetStorage, LocalAssetStorage, TokenSigner};
use tokio::net::TcpListener;

pub mod fixtures;

/// Engines that run without external services
pub const IN_PROCESS_ENGINES: [&str; 3] = ["memory", "document-memory", "sql"];

pub const TOKEN_SECRET: &[u8] = b"integration-test-secret";

/// A registry wired the way the server wires it
pub struct TestRegistry {
    pub dir: TempDir,
    pub ctx: RequestContext,
    pub backend: Arc<dyn Backend>,
    pub local: Arc<LocalAssetStorage>,
    pub services: Arc<ServiceRegistry>,
    pub router: Router,
}

impl TestRegistry {
    /// Registry whose transfer URLs point at a host that is never contacted
    pub async fn new(engine: &str) -> Self {
        Self::with_policy(engine, CreatePolicy::CreateOrGet).await
    }

    pub async fn with_policy(engine: &str, policy: CreatePolicy) -> Self {
        Self::build(engine, policy, "http://registry.test").await
    }

    async fn build(engine: &str, policy: CreatePolicy, base_url: &str) -> Self {
        let ctx = RequestContext::new();

        let config = EngineConfig::default()
            .with_policy(policy)
            .with_database_url("sqlite::memory:");
        let backend = BackendRegistry::with_defaults()
            .build(engine, &config)
            .expect("Failed to build engine");
        backend
            .configure(&ctx)
            .await
            .expect("Failed to configure engine");

        let dir = TempDir::new().expect("Failed to create asset root");
        let signer = Arc::new(TokenSigner::new(TOKEN_SECRET).expect("Failed to create signer"));
        let local = Arc::new(
            LocalAssetStorage::new(dir.path(), base_url, signer)
                .expect("Failed to create local storage"),
        );
        local
            .configure(&ctx)
            .await
            .expect("Failed to configure local storage");

        let state = AppState::new(backend.clone(), local.clone()).with_local_storage(local.clone());
        let services = state.services.clone();
        let router = build_api_server(state);

        Self {
            dir,
            ctx,
            backend,
            local,
            services,
            router,
        }
    }
}

/// A registry served over a real socket
pub struct TestServer {
    pub registry: TestRegistry,
    pub address: String,
}

impl TestServer {
    pub async fn spawn(engine: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let address = format!(
            "http://{}",
            listener.local_addr().expect("Failed to get local address")
        );

        let registry = TestRegistry::build(engine, CreatePolicy::CreateOrGet, &address).await;
        let app = registry.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Failed to start test server");
        });

        Self { registry, address }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client")
    }
}

/// Token segment of a transfer URL
pub fn token_of(url: &str) -> String {
    let (_, rest) = url
        .split_once("/asset/upload/")
        .or_else(|| url.split_once("/asset/download/"))
        .expect("not a transfer url");
    rest.split('/').next().unwrap_or_default().to_string()
}
