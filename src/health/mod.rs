//! Liveness, readiness, version and metrics endpoints.
//!
//! # Data Flow
//! ```text
//! Public router:  /health/alive, /health/ready, /version
//! Admin router:   /admin/health/alive, /admin/health/ready, /admin/version,
//!                 /admin/metrics/prometheus
//! ```
//!
//! # Design Decisions
//! - Probes are cheap and never touch the persistence layer
//! - The security gate lets probes through so load balancers can check
//!   plaintext ports

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::build_info::BuildInfo;
use crate::config::Interface;
use crate::observability::MetricsRegistry;
use crate::routing::paths;

#[derive(Clone)]
pub struct HealthState {
    pub build: Arc<BuildInfo>,
    pub metrics: MetricsRegistry,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub version: String,
}

/// Router with the infrastructure endpoints of `interface`.
pub fn router(interface: Interface, state: HealthState) -> Router {
    let prefix = interface.path_prefix();
    let mut router = Router::new()
        .route(&format!("{prefix}{}", paths::ALIVE_CHECK_PATH), get(alive))
        .route(&format!("{prefix}{}", paths::READY_CHECK_PATH), get(ready))
        .route(&format!("{prefix}{}", paths::VERSION_PATH), get(version));
    if interface == Interface::Admin {
        router = router.route(
            &format!("{prefix}{}", paths::METRICS_PROMETHEUS_PATH),
            get(prometheus),
        );
    }
    router.with_state(state)
}

async fn alive() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

async fn ready() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

async fn version(State(state): State<HealthState>) -> Json<VersionInfo> {
    Json(VersionInfo {
        version: state.build.version.clone(),
    })
}

async fn prometheus(State(state): State<HealthState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
