//! Local LVM Provisioner
//!
//! Loads the node → volume group config, keeps it hot-reloaded, wires the
//! volume lifecycle manager to the Kubernetes helper runtime and serves
//! health and metrics endpoints until interrupted.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use local_lvm_provisioner::{
    ConfigStore, ConfigStoreOptions, Error, HelperExecutor, HelperExecutorConfig,
    KubeHelperRuntime, NodeResolver, ProvisionerMetrics, Result, VolumeLifecycleManager,
    VolumeProvisionerRef,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Local LVM Provisioner - node-local volumes from LVM volume groups
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Node → volume group config file (JSON, or YAML for .yaml/.yml)
    #[arg(long, env = "CONFIG_FILE", default_value = "/etc/config/config.json")]
    config_file: PathBuf,

    /// Namespace helper pods are created in
    #[arg(long, env = "POD_NAMESPACE", default_value = "local-lvm-storage")]
    namespace: String,

    /// Image of the helper pods
    #[arg(
        long,
        env = "HELPER_IMAGE",
        default_value = "local-lvm-provisioner-helper:latest"
    )]
    helper_image: String,

    /// Config reload interval in seconds
    #[arg(long, env = "RELOAD_INTERVAL", default_value = "5")]
    reload_interval_secs: u64,

    /// Delay between helper pod status checks in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MILLIS", default_value = "1000")]
    poll_interval_millis: u64,

    /// Helper pod status checks before giving up
    #[arg(long, env = "MAX_POLL_ATTEMPTS", default_value = "120")]
    max_poll_attempts: u32,

    /// Health and metrics server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Local LVM Provisioner");
    info!("  Version: {}", local_lvm_provisioner::VERSION);
    info!("  Config file: {}", args.config_file.display());
    info!("  Namespace: {}", args.namespace);
    info!("  Helper image: {}", args.helper_image);

    let health_addr: SocketAddr = args.health_addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;
    if args.max_poll_attempts == 0 {
        return Err(Error::Configuration("max poll attempts must be at least 1".into()));
    }

    let metrics = ProvisionerMetrics::new()?;

    // First load must succeed before anything is provisioned
    let store = ConfigStore::new(
        ConfigStoreOptions {
            path: args.config_file.clone(),
            reload_interval: Duration::from_secs(args.reload_interval_secs),
        },
        metrics.clone(),
    );
    store.init().await?;
    store.spawn_watcher();

    let client = kube::Client::try_default().await?;
    let runtime = Arc::new(KubeHelperRuntime::new(client, &args.namespace));
    let executor = HelperExecutor::new(
        HelperExecutorConfig {
            image: args.helper_image.clone(),
            poll_interval: Duration::from_millis(args.poll_interval_millis),
            max_poll_attempts: args.max_poll_attempts,
        },
        runtime,
        metrics.clone(),
    );
    // Owned by the claim-watching framework for the life of the process
    let provisioner: VolumeProvisionerRef =
        VolumeLifecycleManager::new(NodeResolver::new(store.clone()), executor, metrics.clone());
    info!("Provisioner ready");

    let state = AppState {
        store: store.clone(),
        metrics,
    };
    if let Err(e) = run_health_server(health_addr, state).await {
        error!("Health server error: {}", e);
    }

    drop(provisioner);
    store.stop().await;
    info!("Provisioner shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health and Metrics Server
// =============================================================================

#[derive(Clone)]
struct AppState {
    store: Arc<ConfigStore>,
    metrics: Arc<ProvisionerMetrics>,
}

async fn run_health_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/livez", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        Error::Internal(format!("Failed to bind health server: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received interrupt, shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.store.snapshot() {
        Ok(_) => (StatusCode::OK, "ok"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "config not loaded"),
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.gather() {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
