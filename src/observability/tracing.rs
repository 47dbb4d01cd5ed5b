//! Distributed tracing support.
//!
//! A tracer counts as loaded when a provider is configured. Loaded tracers
//! wrap the whole handler in a `TraceLayer` whose span carries the service
//! name and the caller's W3C `traceparent`.

use std::sync::Arc;

use axum::{extract::Request, Router};
use tower_http::trace::TraceLayer;

use crate::config::TracingConfig;

#[derive(Debug, Clone)]
pub struct Tracer {
    provider: Option<String>,
    service_name: Arc<str>,
}

impl Tracer {
    pub fn from_config(config: &TracingConfig) -> Self {
        let provider = Some(config.provider.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        Self {
            provider,
            service_name: Arc::from(config.service_name.as_str()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            provider: None,
            service_name: Arc::from(""),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Wrap `router` in a request span layer.
    pub fn trace(&self, router: Router) -> Router {
        let service = self.service_name.clone();
        router.layer(TraceLayer::new_for_http().make_span_with(move |request: &Request| {
            let traceparent = request
                .headers()
                .get("traceparent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            tracing::info_span!(
                "http.request",
                service = %service,
                method = %request.method(),
                path = %request.uri().path(),
                traceparent,
            )
        }))
    }
}
