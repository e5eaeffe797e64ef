//! API route definitions

use axum::{extract::DefaultBodyLimit, routing::get, routing::put, Router};

use crate::{
    handlers::{
        download_module, download_provider, health_check, list_module_versions,
        list_provider_versions, well_known, AppState,
    },
    transfer,
};

/// Route configuration
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Largest request body accepted by the upload route
    pub max_upload_bytes: usize,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 256 * 1024 * 1024,
        }
    }
}

impl RouteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }
}

/// Build the API router with default route settings
pub fn build_router(state: AppState) -> Router {
    build_router_with_config(state, &RouteConfig::default())
}

pub fn build_router_with_config(state: AppState, config: &RouteConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/.well-known/terraform.json", get(well_known))
        .nest("/asset", build_transfer_routes(config))
        .nest("/v1", build_v1_routes())
        .with_state(state)
}

fn build_transfer_routes(config: &RouteConfig) -> Router<AppState> {
    Router::new()
        .route(
            "/upload/:token",
            put(transfer::upload).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        )
        .route(
            "/download/:token/:file",
            get(transfer::download).head(transfer::head),
        )
}

fn build_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/providers/:organization/:namespace/:name/versions",
            get(list_provider_versions),
        )
        .route(
            "/providers/:organization/:namespace/:name/:version/download/:os/:arch",
            get(download_provider),
        )
        .route(
            "/modules/:organization/:namespace/:name/:system/versions",
            get(list_module_versions),
        )
        .route(
            "/modules/:organization/:namespace/:name/:system/:version/download",
            get(download_module),
        )
}
