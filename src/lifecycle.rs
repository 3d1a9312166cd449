//! Process lifecycle: signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM both cancel the shared [`CancellationToken`]; servers
//! watching the token stop accepting connections and drain in-flight
//! requests before exiting.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Spawn signal listeners that cancel `shutdown` on SIGINT or SIGTERM.
pub fn install_signal_handlers(shutdown: CancellationToken) {
    let shutdown_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                shutdown_sigint.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, initiating graceful shutdown");
                    shutdown.cancel();
                }
                Err(e) => {
                    error!(error = %e, "Failed to listen for SIGTERM");
                }
            }
        });
    }

    #[cfg(not(unix))]
    let _ = shutdown;
}

/// Install signal handlers and return a token cancelled on the first signal.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    install_signal_handlers(token.clone());
    token
}
