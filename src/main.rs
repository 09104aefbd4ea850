use anyhow::Context;
use clap::Parser;
use php_server_manager::config::{ManagerConfig, default_config_path, validate_config};
use php_server_manager::{ApiServer, ServerManager};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

/// Supervise PHP server processes behind an HTTP management API.
#[derive(Debug, Parser)]
#[command(name = "php-server-manager", version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file.
    ///
    /// Default: `config.yaml` in the platform configuration directory.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    validate_config(&config).context("Invalid configuration")?;

    let manager = ServerManager::builder(config.clone())
        .build()
        .await
        .context("Failed to initialize server manager")?;

    let settings = manager.settings()?;
    let port = settings.port.parse::<u16>().unwrap_or_else(|_| {
        tracing::warn!(port = %settings.port, "Saved API port is not a number, using configured port");
        config.server.port
    });

    let mut api = ApiServer::new(settings.host.clone(), port).auth(config.auth.clone());
    if let Some(workers) = config.server.workers {
        api = api.workers(workers);
    }
    let api = match api.start(manager.clone()) {
        Ok(api) => api,
        Err(e) => {
            manager.shutdown().await;
            return Err(e).context("Failed to start management API");
        }
    };

    tracing::info!(host = %settings.host, port, "Server manager running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }

    api.shutdown().await;
    manager.shutdown().await;
    Ok(())
}

fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<ManagerConfig> {
    let path = explicit.unwrap_or_else(default_config_path);
    ManagerConfig::from_file(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
