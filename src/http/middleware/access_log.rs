//! Access logging.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};

use crate::config::{Interface, ServeConfig};
use crate::routing::paths;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Per-interface access logger.
#[derive(Debug, Clone)]
pub struct AccessLog {
    service: Arc<str>,
    excluded: Arc<[String]>,
}

impl AccessLog {
    pub fn new(service: impl AsRef<str>) -> Self {
        Self {
            service: Arc::from(service.as_ref()),
            excluded: Arc::from(Vec::new()),
        }
    }

    /// Logger for `interface`, honouring `request_log.disable_for_health`.
    pub fn for_interface(config: &ServeConfig, interface: Interface) -> Self {
        let log = Self::new(format!("{interface}: {}", config.issuer_url()));
        if !config.disable_health_access_log(interface) {
            return log;
        }
        let prefix = interface.path_prefix();
        log.exclude_paths(
            [
                paths::ALIVE_CHECK_PATH,
                paths::READY_CHECK_PATH,
                paths::VERSION_PATH,
                paths::METRICS_PROMETHEUS_PATH,
            ]
            .map(|p| format!("{prefix}{p}")),
        )
    }

    pub fn exclude_paths(mut self, paths: impl IntoIterator<Item = String>) -> Self {
        let mut excluded = self.excluded.to_vec();
        excluded.extend(paths);
        self.excluded = Arc::from(excluded);
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded.iter().any(|p| p == path)
    }
}

pub async fn access_log(State(log): State<AccessLog>, mut request: Request, next: Next) -> Response {
    if log.is_excluded(request.uri().path()) {
        return next.run(request).await;
    }

    let start = Instant::now();
    let request_id = match request.headers().get(X_REQUEST_ID) {
        Some(id) => id.clone(),
        None => {
            let id = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
            request.headers_mut().insert(X_REQUEST_ID, id.clone());
            id
        }
    };
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string());

    tracing::debug!(
        service = %log.service,
        request_id = ?request_id,
        method = %method,
        path = %path,
        "started handling request"
    );

    let mut response = next.run(request).await;
    response.headers_mut().insert(X_REQUEST_ID, request_id.clone());

    tracing::info!(
        service = %log.service,
        request_id = request_id.to_str().unwrap_or_default(),
        method = %method,
        path = %path,
        remote = remote.as_deref().unwrap_or("-"),
        status = response.status().as_u16(),
        took_ms = start.elapsed().as_millis() as u64,
        "completed handling request"
    );
    response
}
