//! Fleet operator - bootstraps remote cluster clients and restarts on drift

#![deny(missing_docs)]

pub mod config;
pub mod registrar;

use fleet_clientconfig::ShutdownSignal;
use tracing::warn;

/// Turn SIGINT/SIGTERM into a shutdown request
///
/// Returns once a shutdown has been requested, by a signal or by anything
/// else holding the same [`ShutdownSignal`].
pub async fn forward_signals(shutdown: ShutdownSignal) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {
            shutdown.request("SIGINT received");
        }
        _ = terminate => {
            shutdown.request("SIGTERM received");
        }
        _ = shutdown.requested() => {}
    }
}
