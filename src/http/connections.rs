//! Connection ownership for one serving interface.
//!
//! # Data Flow
//! ```text
//! Listener::accept → (io, peer)
//!     → router + ConnectInfo(peer)
//!     → hyper-util auto connection (HTTP/1 and HTTP/2), watched for shutdown
//!     → task in the interface's JoinSet
//!
//! Shutdown:
//!     stop accepting → graceful close of every watched connection
//!     → drain timeout passes → abort the tasks still open
//! ```
//!
//! When [`serve`] returns, no connection accepted on the listener is alive.

use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::serve::Listener;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::task::JoinSet;
use tower::ServiceExt;

use crate::config::Interface;
use crate::http::server::{transition, TaskState};
use crate::lifecycle::ShutdownSignal;

/// How the drain that follows a shutdown trigger ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drained {
    /// Every connection closed within the drain timeout.
    Completed,
    /// The timeout passed; `aborted` connections were still open.
    TimedOut { aborted: usize },
}

/// Serve `router` on `listener` until `signal` fires, then drain.
///
/// Each request carries `ConnectInfo<L::Addr>` for the connection it
/// arrived on.
pub(crate) async fn serve<L>(
    interface: Interface,
    mut listener: L,
    router: Router,
    mut signal: ShutdownSignal,
    drain_timeout: Duration,
) -> Drained
where
    L: Listener,
    L::Addr: Clone + Send + Sync + 'static,
{
    let builder = Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        let (io, peer) = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = signal.recv() => break,
        };

        let service = router.clone().map_request(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(ConnectInfo(peer.clone()));
            request
        });
        let connection = builder
            .serve_connection_with_upgrades(TokioIo::new(io), TowerToHyperService::new(service))
            .into_owned();
        let connection = graceful.watch(connection);
        connections.spawn(async move {
            if let Err(e) = connection.await {
                tracing::trace!(interface = %interface, error = %e, "Connection closed with error");
            }
        });

        // Reap finished connections
        while connections.try_join_next().is_some() {}
    }

    drop(listener);
    transition(interface, TaskState::ShuttingDown);
    tracing::info!(
        interface = %interface,
        connections = connections.len(),
        timeout_ms = drain_timeout.as_millis() as u64,
        "Draining in-flight requests"
    );

    let drained = tokio::time::timeout(drain_timeout, async {
        graceful.shutdown().await;
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_ok() {
        return Drained::Completed;
    }

    let aborted = connections.len();
    connections.abort_all();
    while connections.join_next().await.is_some() {}
    Drained::TimedOut { aborted }
}
