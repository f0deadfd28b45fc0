//! Shutdown signal handling.

use tokio::signal;
use tracing::error;

/// Resolve once the process is asked to stop; returns the signal name.
///
/// If a handler cannot be installed that source is ignored and logged, so
/// the server keeps running until another source fires.
pub async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        "ctrl+c"
    };

    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
        "sigterm"
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<&'static str>();

    tokio::select! {
        name = ctrl_c => name,
        name = sigterm => name,
    }
}
