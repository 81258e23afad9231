//! # Smart-State Scan Service
//!
//! Accepts hypervisor credentials over HTTP, runs one background scan at a
//! time across the VM inventory and serves the last persisted result.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /init_scan` | start a scan (`409` while one is running) |
//! | `GET /results` | last persisted result, `202` before the first one |
//! | `GET /scan/status` | lifecycle snapshot of the scan slot |

use anyhow::Context;
use clap::Parser;
use smartstate_core::{InventoryConnector, ResultStore, inventory::GatewayConnector};
use smartstate_server::{
    infra::{
        app_state::AppState,
        config::{Config, ConfigLoad, ConfigLoader},
        scan::ScanControlPlane,
    },
    routes,
};
use std::{path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "smartstate-server")]
#[command(about = "Single-flight VM smart-state scan service")]
struct Cli {
    /// Path to a smart-state.toml (overrides SMART_STATE_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Alternate .env file to load before reading the environment
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Serve a synthetic in-memory inventory instead of the gateway
    #[arg(long, env = "SMART_STATE_DEMO_MODE", default_value_t = false)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_runtime_config(&cli)?;
    run_server(config, cli.demo).await
}

fn load_runtime_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }

    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host.clone() {
        config.server.host = host;
    }

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    info!(
        extraction_timeout_secs = config.scan.extraction_timeout.as_secs(),
        max_vms = ?config.scan.max_vms,
        max_vms_file = %config.scan.max_vms_file.display(),
        results_path = %config.scan.results_path.display(),
        gateway = %config.inventory.gateway_url,
        "scan configuration"
    );

    Ok(config)
}

fn build_connector(
    config: &Config,
    demo: bool,
) -> anyhow::Result<Arc<dyn InventoryConnector>> {
    if demo {
        #[cfg(feature = "demo")]
        {
            warn!("demo mode enabled; scanning a synthetic in-memory inventory");
            return Ok(Arc::new(
                smartstate_core::inventory::InMemoryInventory::demo(),
            ));
        }
        #[cfg(not(feature = "demo"))]
        anyhow::bail!("--demo requires a build with the `demo` feature");
    }

    let connector = GatewayConnector::new(&config.inventory.gateway_url)
        .context("invalid inventory gateway url")?;
    Ok(Arc::new(connector))
}

async fn run_server(config: Config, demo: bool) -> anyhow::Result<()> {
    let connector = build_connector(&config, demo)?;
    let store = ResultStore::new(&config.scan.results_path);
    let scan_control = Arc::new(ScanControlPlane::new(
        connector,
        store,
        config.scan.settings(),
    ));

    let shutdown_grace = config.server.shutdown_grace;
    let listener = tokio::net::TcpListener::bind((
        config.server.host.as_str(),
        config.server.port,
    ))
    .await
    .with_context(|| {
        format!(
            "failed to bind {}:{}",
            config.server.host, config.server.port
        )
    })?;

    let state = AppState::new(Arc::clone(&scan_control));
    let router = routes::create_app(state);

    info!(addr = %listener.local_addr()?, "smart-state scan service listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scan_control.shutdown(shutdown_grace).await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
