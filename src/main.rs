use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use plot_hole::{create_router, utils::init_tracing, AppState, Config};

#[derive(Debug, Parser)]
#[command(name = "plot-hole", version, about = "Pay-per-critique screenplay analyzer")]
struct Cli {
    /// TOML secrets file; the environment is used when it does not exist
    #[arg(long, env = "SECRETS_FILE", default_value = "secrets.toml")]
    secrets: PathBuf,

    /// Bind address (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());

    let mut config = match Config::load(Some(&cli.secrets)) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    info!("Configuration loaded: {:?}", config.server);

    let (host, port) = (config.server.host.clone(), config.server.port);
    let state = AppState::from_config(config)?;
    let app = create_router(state);

    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
