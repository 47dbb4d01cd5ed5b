//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by interface, method, path, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_interfaces_registered` (gauge): interfaces wired into the registry
//!
//! # Design Decisions
//! - Paths are anonymised against a whitelist fixed at startup
//! - One registry shared by both interfaces; registration is concurrent-safe

use std::sync::Arc;

use dashmap::DashSet;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use sha2::{Digest, Sha256};

use crate::build_info::BuildInfo;
use crate::config::{Interface, ServeConfig};

pub const REQUESTS_TOTAL: &str = "http_requests_total";
pub const REQUEST_DURATION: &str = "http_request_duration_seconds";
pub const INTERFACES_REGISTERED: &str = "http_interfaces_registered";

/// Shared metrics registry backed by a Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRegistry {
    handle: PrometheusHandle,
    interfaces: Arc<DashSet<Interface>>,
}

impl MetricsRegistry {
    /// Install the Prometheus recorder as the global `metrics` recorder.
    pub fn install() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        Ok(Self::from_handle(handle))
    }

    /// A registry whose recorder is not installed globally.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self::from_handle(recorder.handle())
    }

    fn from_handle(handle: PrometheusHandle) -> Self {
        metrics::describe_counter!(REQUESTS_TOTAL, "Total HTTP requests handled");
        metrics::describe_histogram!(REQUEST_DURATION, "HTTP request latency in seconds");
        Self {
            handle,
            interfaces: Arc::new(DashSet::new()),
        }
    }

    /// Record that an interface's router reports into this registry.
    pub fn register_router(&self, interface: Interface) {
        if self.interfaces.insert(interface) {
            metrics::gauge!(INTERFACES_REGISTERED).set(self.interfaces.len() as f64);
            tracing::debug!(interface = %interface, "Router registered with metrics registry");
        }
    }

    pub fn is_registered(&self, interface: Interface) -> bool {
        self.interfaces.contains(&interface)
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("interfaces", &self.interfaces.len())
            .finish()
    }
}

/// Deployment identity attached to usage metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsIdentity {
    pub service: &'static str,
    pub cluster_id: String,
    pub is_development: bool,
    pub build_version: String,
    pub build_hash: String,
    pub build_time: String,
}

impl AnalyticsIdentity {
    pub fn new(config: &ServeConfig, build: &BuildInfo) -> Self {
        let issuer = config.issuer_url();
        Self {
            service: "serve-orchestrator",
            cluster_id: cluster_id(issuer, &config.dsn),
            is_development: config.is_memory_dsn()
                || issuer.is_empty()
                || issuer.contains("localhost"),
            build_version: build.version.clone(),
            build_hash: build.commit.clone(),
            build_time: build.date.clone(),
        }
    }
}

/// Hex SHA-256 of `issuer|dsn`.
pub fn cluster_id(issuer: &str, dsn: &str) -> String {
    let digest = Sha256::digest(format!("{issuer}|{dsn}").as_bytes());
    hex::encode(digest)
}
