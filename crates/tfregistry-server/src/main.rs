//! Terraform registry server
//!
//! Loads configuration, builds the selected storage engine and asset store,
//! and serves the HTTP surface until interrupted.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tfregistry_api::{build_api_server_with_config, AppState};
use tfregistry_core::{CreatePolicy, RequestContext};
use tfregistry_db::{mask_password, Backend, BackendRegistry, EngineLifecycle};
use tfregistry_storage::{create_asset_storage, AssetStack, AssetStorage};
use tokio::signal;
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration directory
    #[arg(short, long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: String,

    /// Environment (development, production, etc.)
    #[arg(short, long, env = "ENVIRONMENT", default_value = "development")]
    environment: String,

    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Storage engine name
    #[arg(long, env = "TFREGISTRY_ENGINE")]
    engine: Option<String>,

    #[arg(long, env = "TFREGISTRY_CREATE_POLICY")]
    create_policy: Option<CreatePolicy>,

    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Root directory of local asset storage
    #[arg(long, env = "ASSET_ROOT")]
    asset_root: Option<String>,

    /// Base URL clients reach this server at
    #[arg(long, env = "PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(engine) = self.engine {
            config.backend.engine = engine;
        }
        if let Some(policy) = self.create_policy {
            config.backend.create_policy = policy;
        }
        if let Some(url) = self.database_url {
            config.backend.database_url = Some(url);
        }
        if let Some(url) = self.redis_url {
            config.backend.redis_url = Some(url);
        }
        if let Some(root) = self.asset_root {
            config.storage.local_root = root.into();
        }
        if let Some(url) = self.public_base_url {
            config.storage.public_base_url = url;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let environment = args.environment.clone();
    let mut config = ServerConfig::load(&args.config_dir, &environment)
        .with_context(|| format!("Failed to load configuration from {}", args.config_dir))?;
    args.apply(&mut config);

    telemetry::init(&config.logging).context("Failed to initialise logging")?;

    info!(environment = %environment, "Starting Terraform registry server");
    if let Some(url) = &config.backend.database_url {
        info!(database = %mask_password(url), "Relational engine target");
    }

    let ctx = RequestContext::new();
    let backend = setup_backend(&ctx, &config).await?;
    let assets = setup_storage(&ctx, &config).await?;

    let mut state = AppState::new(backend.clone(), assets.storage.clone());
    if let Some(local) = assets.local {
        state = state.with_local_storage(local);
    }
    let app = build_api_server_with_config(state, config.middleware(), &config.routes());

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("Invalid HTTP bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind HTTP server")?;
    info!("HTTP Server listening on http://{}", addr);

    let served = if config.server.graceful_shutdown {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    } else {
        axum::serve(listener, app).await
    };

    if let Err(e) = backend.close(&RequestContext::new()).await {
        warn!(error = %e, "Failed to close storage engine");
    }
    served.context("HTTP Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn setup_backend(ctx: &RequestContext, config: &ServerConfig) -> Result<Arc<dyn Backend>> {
    let registry = BackendRegistry::with_defaults();
    let backend = registry
        .build(&config.backend.engine, &config.backend.engine_config())
        .context("Failed to build storage engine")?;

    backend
        .configure(ctx)
        .await
        .with_context(|| format!("Failed to configure engine '{}'", config.backend.engine))?;

    info!(
        engine = backend.engine_name(),
        policy = %backend.create_policy(),
        "Storage engine ready"
    );
    Ok(backend)
}

async fn setup_storage(ctx: &RequestContext, config: &ServerConfig) -> Result<AssetStack> {
    let stack = create_asset_storage(&config.storage)
        .await
        .context("Failed to build asset storage")?;

    stack
        .storage
        .configure(ctx)
        .await
        .context("Failed to configure asset storage")?;

    Ok(stack)
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown"),
    }
}
