//! OS signal handling.
//!
//! SIGTERM and SIGINT trigger graceful shutdown. Draining afterwards is
//! bounded by the serve drain timeout.

use crate::lifecycle::Shutdown;

/// Wait for SIGINT or SIGTERM, then trigger `shutdown`.
pub async fn listen(shutdown: Shutdown) {
    let mut signal = shutdown.subscribe();
    tokio::select! {
        name = wait_for_signal() => {
            tracing::info!(signal = name, "Shutdown signal received");
            shutdown.trigger();
        }
        _ = signal.recv() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            return ctrl_c().await;
        }
    };
    tokio::select! {
        name = ctrl_c() => name,
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn returns_when_shutdown_triggered_elsewhere() {
        let shutdown = Shutdown::new();
        let listener = tokio::spawn(listen(shutdown.clone()));
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .unwrap()
            .unwrap();
    }
}
