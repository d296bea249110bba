//! Signal handling for graceful shutdown.
//!
//! The CLI waits for background refreshes after printing its output.
//! SIGINT or SIGTERM stops that wait; the store is never left worse off
//! than by a crash, since a stuck `update-in-progress` flag expires.

use std::future::Future;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Resolve when SIGINT or SIGTERM arrives.
///
/// If no handler can be registered (e.g. in restricted environments) this
/// never resolves and signals keep their default behaviour.
pub async fn shutdown_signal() {
    let sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("Failed to register SIGINT handler: {}", e);
            None
        }
    };

    let sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            None
        }
    };

    match (sigint, sigterm) {
        (Some(mut int), Some(mut term)) => {
            tokio::select! {
                _ = int.recv() => info!("Received SIGINT, stopping..."),
                _ = term.recv() => info!("Received SIGTERM, stopping..."),
            }
        }
        (Some(mut int), None) => {
            int.recv().await;
            info!("Received SIGINT, stopping...");
        }
        (None, Some(mut term)) => {
            term.recv().await;
            info!("Received SIGTERM, stopping...");
        }
        (None, None) => {
            warn!("No signal handlers registered - graceful shutdown disabled");
            std::future::pending::<()>().await;
        }
    }
}

/// Run `fut` to completion unless a shutdown signal arrives first.
///
/// Returns `None` when interrupted. `fut` is dropped in that case; tasks it
/// was waiting on keep running until the runtime shuts down.
pub async fn until_shutdown<F: Future>(fut: F) -> Option<F::Output> {
    tokio::select! {
        output = fut => Some(output),
        _ = shutdown_signal() => None,
    }
}
