//! Guardian server entry point.

use anyhow::{Context, Result};
use clap::Parser;
use guardian::application::Guardian;
use guardian::infrastructure::config::ConfigLoader;
use guardian::infrastructure::logging;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "guardian", about = "Agentic SRE controller for Kubernetes")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "guardian.yaml")]
    config: std::path::PathBuf,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,

    /// Run one full scan, print the result, and exit
    #[arg(long)]
    scan_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::load_with_file(&cli.config)
        .context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    logging::init(&config).context("Failed to initialise logging")?;
    info!(port = config.port, "cluster guardian starting");

    let guardian = Guardian::build(config.clone())
        .await
        .context("Failed to build component graph")?;

    if cli.scan_once {
        let result = guardian.state.scanner.scan().await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    guardian.start_background().await;

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!(addr = %listener.local_addr()?, "HTTP surface listening");

    let router = guardian.router();
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    guardian.shutdown().await;
    Ok(())
}
