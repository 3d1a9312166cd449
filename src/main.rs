//! MessageHub - HTTP/JSON message routing hub.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::PathBuf;

use clap::Parser;
use messagehub::config;
use messagehub::lifecycle;
use messagehub::transport::server::HubServer;
use tracing::{error, info};

/// Command-line options.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file.
    /// If not specified, searches: MESSAGEHUB_CONFIG env, /etc/messagehub/config.yaml, ./messagehub.yaml
    #[arg(long, env = "MESSAGEHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address override (e.g. "0.0.0.0:8080")
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The guard must live for the whole program so buffered logs are flushed.
    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut hub_config = config::load(cli.config.as_deref()).inspect_err(|e| {
        error!(error = %e, "Invalid configuration, refusing to start");
    })?;
    if let Some(listen) = cli.listen {
        hub_config.listen_addr = listen;
        config::validate(&hub_config)?;
    }

    info!(
        listen = %hub_config.listen_addr,
        order_service = %hub_config.order_service_url,
        payment_service = %hub_config.payment_service_url,
        handler_timeout_ms = hub_config.handler_timeout.as_millis(),
        "Starting MessageHub"
    );

    let shutdown = lifecycle::shutdown_token();
    let server = HubServer::from_config(&hub_config)?;

    if let Err(e) = server.run(shutdown).await {
        error!(error = %e, "Hub server failed");
        let e: Box<dyn std::error::Error> = e;
        return Err(e);
    }

    info!("MessageHub stopped");
    Ok(())
}
