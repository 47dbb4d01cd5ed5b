//! Request metrics collector.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::config::Interface;
use crate::observability::metrics::{REQUESTS_TOTAL, REQUEST_DURATION};

/// Records request counts and latency for one interface.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    interface: Interface,
    whitelist: Arc<[String]>,
}

impl MetricsCollector {
    pub fn new(interface: Interface, whitelist: Arc<[String]>) -> Self {
        Self {
            interface,
            whitelist,
        }
    }

    /// Longest whitelisted path covering `path`, or `/`.
    pub fn anonymize<'a>(&'a self, path: &str) -> &'a str {
        self.whitelist
            .iter()
            .filter(|allowed| covers(allowed, path))
            .max_by_key(|allowed| allowed.len())
            .map(String::as_str)
            .unwrap_or("/")
    }
}

fn covers(allowed: &str, path: &str) -> bool {
    match path.strip_prefix(allowed) {
        Some(rest) => rest.is_empty() || allowed.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

pub async fn collect_metrics(
    State(collector): State<MetricsCollector>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = collector.anonymize(request.uri().path()).to_string();

    let response = next.run(request).await;

    let interface = collector.interface.as_str();
    let status = response.status().as_u16().to_string();
    metrics::counter!(
        REQUESTS_TOTAL,
        "interface" => interface,
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        REQUEST_DURATION,
        "interface" => interface,
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}
