//! CORS evaluated against the live configuration on every request.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method},
    middleware::Next,
    response::Response,
};
use tower::{Layer, ServiceExt};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::{CorsConfig, Interface, LiveConfig};

/// CORS decision source for one interface.
#[derive(Debug, Clone)]
pub struct ContextualCors {
    interface: Interface,
    config: LiveConfig,
}

impl ContextualCors {
    pub fn new(interface: Interface, config: LiveConfig) -> Self {
        Self { interface, config }
    }

    /// Current policy, or `None` when CORS is disabled.
    pub fn current(&self) -> Option<CorsLayer> {
        let config = self.config.load();
        let settings = config.cors(self.interface);
        settings.enabled.then(|| cors_layer(settings))
    }
}

pub async fn contextual_cors(State(cors): State<ContextualCors>, request: Request, next: Next) -> Response {
    let Some(layer) = cors.current() else {
        return next.run(request).await;
    };
    match layer.layer(next).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

pub fn cors_layer(settings: &CorsConfig) -> CorsLayer {
    let origin = if settings.allowed_origins.iter().any(|o| o == "*") {
        // A literal wildcard cannot be combined with credentials
        if settings.allow_credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        }
    } else {
        AllowOrigin::list(
            settings
                .allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    let methods: Vec<Method> = settings
        .allowed_methods
        .iter()
        .filter_map(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
        .collect();

    let mut layer = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(header_names(&settings.allowed_headers))
        .expose_headers(header_names(&settings.exposed_headers))
        .allow_credentials(settings.allow_credentials);
    if settings.max_age_secs > 0 {
        layer = layer.max_age(Duration::from_secs(settings.max_age_secs));
    }
    layer
}

fn header_names(names: &[String]) -> Vec<HeaderName> {
    names
        .iter()
        .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServeConfig;

    #[test]
    fn disabled_policy_yields_nothing() {
        let cors = ContextualCors::new(Interface::Public, LiveConfig::new(ServeConfig::default()));
        assert!(cors.current().is_none());
    }

    #[test]
    fn policy_follows_live_config() {
        let live = LiveConfig::new(ServeConfig::default());
        let cors = ContextualCors::new(Interface::Public, live.clone());

        let mut next = ServeConfig::default();
        next.serve.public.cors.enabled = true;
        next.serve.public.cors.allowed_origins = vec!["*".into()];
        live.store(next);

        assert!(cors.current().is_some());
        assert!(ContextualCors::new(Interface::Admin, live).current().is_none());
    }
}
