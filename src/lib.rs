pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod services;

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::Commands;
pub use config::Config;
use db::Store;
use services::{LogMailer, SeaOrmAuthService};

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let mut log_level = config.general.log_level.clone();
    log_level.push_str(",sqlx=warn,hyper_util=off");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn run(command: Commands, config: Config) -> anyhow::Result<()> {
    if command == Commands::Init {
        if Config::create_default_if_missing()? {
            println!("✓ Config file created. Set security.session.jwt_secret and run again.");
        } else {
            println!("Config file already exists.");
        }
        return Ok(());
    }

    init_tracing(&config);
    config.validate()?;

    match command {
        Commands::Serve => {
            let prometheus_handle = if config.observability.metrics_enabled {
                use metrics_exporter_prometheus::PrometheusBuilder;
                let handle = PrometheusBuilder::new()
                    .install_recorder()
                    .context("Failed to install Prometheus recorder")?;
                info!("Prometheus metrics recorder initialized");
                Some(handle)
            } else {
                None
            };

            run_server(config, prometheus_handle).await
        }
        Commands::BootstrapAdmin { username, email } => {
            run_bootstrap_admin(config, &username, &email).await
        }
        Commands::Init => Ok(()),
    }
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("Pawgate v{} starting...", env!("CARGO_PKG_VERSION"));

    if !config.server.enabled {
        info!("HTTP server disabled in config; nothing to do");
        return Ok(());
    }

    let port = config.server.port;
    let api_state = api::create_app_state_from_config(config, prometheus_handle).await?;
    let app = api::router(api_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Web Server running at http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }
}

async fn run_bootstrap_admin(config: Config, username: &str, email: &str) -> anyhow::Result<()> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let service = SeaOrmAuthService::new(store, &config, Arc::new(LogMailer))?;
    let link = service
        .bootstrap_admin(username, email)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create administrator: {e}"))?;

    println!("✓ Administrator '{username}' created.");
    println!("Open this link to choose a password (valid once):");
    println!("{link}");
    Ok(())
}
