//! API request handlers
//!
//! Registry protocol endpoints and health. Organization scoping comes from
//! the path; every route serves the private tier.

use axum::{
    extract::{Path, State},
    http::{HeaderName, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tfregistry_core::{ModuleKey, ProviderKey, RegistryTier, RequestContext};
use tfregistry_db::{Backend, EngineLifecycle};
use tfregistry_service::{
    ModuleVersionsResponse, ProviderDownload, ProviderVersionsResponse, ServiceRegistry,
};
use tfregistry_storage::{AssetBackend, AssetStorage, LocalAssetStorage};
use tracing::{debug, instrument, warn};

use crate::{
    error::{ApiError, ApiResult},
    responses::{ComponentHealth, HealthResponse},
};

/// Header carrying the module source address
pub const TERRAFORM_GET_HEADER: HeaderName = HeaderName::from_static("x-terraform-get");

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<ServiceRegistry>,
    pub backend: Arc<dyn Backend>,
    pub storage: Arc<dyn AssetBackend>,
    /// Set when assets live on the local filesystem and this server serves them
    pub local: Option<Arc<LocalAssetStorage>>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, storage: Arc<dyn AssetBackend>) -> Self {
        Self {
            services: Arc::new(ServiceRegistry::new(backend.clone(), storage.clone())),
            backend,
            storage,
            local: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_local_storage(mut self, local: Arc<LocalAssetStorage>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Fresh context bounded by the request timeout
    pub fn context(&self) -> RequestContext {
        RequestContext::with_timeout(self.request_timeout)
    }

    pub(crate) fn local_storage(&self) -> ApiResult<&Arc<LocalAssetStorage>> {
        self.local
            .as_ref()
            .ok_or_else(|| ApiError::not_found("asset transfer is not served by this registry"))
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderPath {
    pub organization: String,
    pub namespace: String,
    pub name: String,
}

impl ProviderPath {
    fn key(&self) -> ApiResult<ProviderKey> {
        Ok(ProviderKey::new(
            &self.organization,
            RegistryTier::Private,
            &self.namespace,
            &self.name,
        )?)
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderDownloadPath {
    pub organization: String,
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Deserialize)]
pub struct ModulePath {
    pub organization: String,
    pub namespace: String,
    pub name: String,
    pub system: String,
}

impl ModulePath {
    fn key(&self) -> ApiResult<ModuleKey> {
        Ok(ModuleKey::new(
            &self.organization,
            RegistryTier::Private,
            &self.namespace,
            &self.name,
            &self.system,
        )?)
    }
}

#[derive(Debug, Deserialize)]
pub struct ModuleDownloadPath {
    pub organization: String,
    pub namespace: String,
    pub name: String,
    pub system: String,
    pub version: String,
}

// ============================================================================
// Registry Protocol Handlers
// ============================================================================

/// Service discovery document
pub async fn well_known() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "providers.v1": "/v1/providers/",
        "modules.v1": "/v1/modules/",
    }))
}

#[instrument(skip(state))]
pub async fn list_provider_versions(
    State(state): State<AppState>,
    Path(path): Path<ProviderPath>,
) -> ApiResult<Json<ProviderVersionsResponse>> {
    let key = path.key()?;
    let ctx = state.context();

    let versions = state
        .services
        .discovery()
        .list_provider_versions(&ctx, &key)
        .await?;

    Ok(Json(versions))
}

#[instrument(skip(state))]
pub async fn download_provider(
    State(state): State<AppState>,
    Path(path): Path<ProviderDownloadPath>,
) -> ApiResult<Json<ProviderDownload>> {
    let key = ProviderKey::new(
        &path.organization,
        RegistryTier::Private,
        &path.namespace,
        &path.name,
    )?
    .version(&path.version)?;
    let ctx = state.context();

    let download = state
        .services
        .discovery()
        .resolve_provider_download(&ctx, &key, &path.os, &path.arch)
        .await?;

    debug!(filename = %download.filename, "Resolved provider download");
    Ok(Json(download))
}

#[instrument(skip(state))]
pub async fn list_module_versions(
    State(state): State<AppState>,
    Path(path): Path<ModulePath>,
) -> ApiResult<Json<ModuleVersionsResponse>> {
    let key = path.key()?;
    let ctx = state.context();

    let versions = state
        .services
        .discovery()
        .list_module_versions(&ctx, &key)
        .await?;

    Ok(Json(versions))
}

/// Answers 204 with the archive location in `X-Terraform-Get`
#[instrument(skip(state))]
pub async fn download_module(
    State(state): State<AppState>,
    Path(path): Path<ModuleDownloadPath>,
) -> ApiResult<impl IntoResponse> {
    let key = ModuleKey::new(
        &path.organization,
        RegistryTier::Private,
        &path.namespace,
        &path.name,
        &path.system,
    )?
    .version(&path.version)?;
    let ctx = state.context();

    let download = state
        .services
        .discovery()
        .resolve_module_download(&ctx, &key)
        .await?;

    Ok((
        StatusCode::NO_CONTENT,
        [(TERRAFORM_GET_HEADER, download.download_url)],
    ))
}

// ============================================================================
// Health Handlers
// ============================================================================

#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> HealthResponse {
    let ctx = state.context();

    let backend = match state.backend.health_check(&ctx).await {
        Ok(()) => ComponentHealth::healthy().with_message(state.backend.engine_name()),
        Err(e) => {
            warn!(error = %e, "Backend health check failed");
            ComponentHealth::unhealthy(format!("{}: {}", state.backend.engine_name(), e))
        }
    };

    HealthResponse::healthy()
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_check("backend", backend)
        .with_check(
            "storage",
            ComponentHealth::healthy().with_message(state.storage.kind()),
        )
        .compute_status()
}
