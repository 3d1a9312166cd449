//! Local Order and Payment mock services for running the hub end to end.
//!
//! Starts both mocks and serves until SIGINT/SIGTERM.

use std::time::Duration;

use clap::Parser;
use messagehub::lifecycle;
use messagehub::mock::{DEFAULT_LATENCY, MockHandler};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Mock Order and Payment services", long_about = None)]
struct Args {
    /// Bind host for both services
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Order Service port
    #[arg(long, env = "ORDER_SERVICE_PORT", default_value_t = 8081)]
    order_port: u16,

    /// Payment Service port
    #[arg(long, env = "PAYMENT_SERVICE_PORT", default_value_t = 8082)]
    payment_port: u16,

    /// Artificial processing latency (e.g. "500ms", "2s")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "500ms")]
    latency: Duration,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.latency != DEFAULT_LATENCY {
        info!(latency_ms = args.latency.as_millis(), "Using custom latency");
    }

    let order = MockHandler::order()
        .with_latency(args.latency)
        .bind(&format!("{}:{}", args.host, args.order_port))
        .await?;
    let payment = MockHandler::payment()
        .with_latency(args.latency)
        .bind(&format!("{}:{}", args.host, args.payment_port))
        .await?;

    info!(
        order = %order.url(),
        payment = %payment.url(),
        "Mock services ready"
    );

    lifecycle::shutdown_token().cancelled().await;
    info!("Stopping mock services");

    tokio::join!(order.shutdown(), payment.shutdown());
    Ok(())
}
