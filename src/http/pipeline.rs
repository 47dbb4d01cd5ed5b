//! Middleware pipeline assembly.
//!
//! The fold order is fixed, outermost first:
//!
//! ```text
//! reject-insecure gate (omitted on filesystem sockets)
//!     → contextual CORS
//!     → service locator middlewares, in registration order
//!     → access log
//!     → metrics collector
//!     → router
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{from_fn_with_state, Next},
    response::Response,
    Router,
};

use crate::config::{Interface, LiveConfig};
use crate::http::middleware::{
    access_log, collect_metrics, contextual_cors, AccessLog, ContextualCors, HttpMiddleware,
    MetricsCollector, ServiceLocator,
};
use crate::security::{reject_insecure_requests, InsecureGate};

/// One wrapping step of a pipeline.
#[derive(Clone)]
pub enum Stage {
    RejectInsecure(InsecureGate),
    Cors(ContextualCors),
    Custom(HttpMiddleware),
    AccessLog(AccessLog),
    Metrics(MetricsCollector),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::RejectInsecure(_) => "reject_insecure",
            Stage::Cors(_) => "cors",
            Stage::Custom(_) => "service_locator",
            Stage::AccessLog(_) => "access_log",
            Stage::Metrics(_) => "metrics",
        }
    }

    fn wrap(self, router: Router) -> Router {
        match self {
            Stage::RejectInsecure(gate) => {
                router.layer(from_fn_with_state(gate, reject_insecure_requests))
            }
            Stage::Cors(cors) => router.layer(from_fn_with_state(cors, contextual_cors)),
            Stage::Custom(middleware) => router.layer(from_fn_with_state(middleware, run_custom)),
            Stage::AccessLog(log) => router.layer(from_fn_with_state(log, access_log)),
            Stage::Metrics(collector) => router.layer(from_fn_with_state(collector, collect_metrics)),
        }
    }
}

async fn run_custom(State(middleware): State<HttpMiddleware>, request: Request, next: Next) -> Response {
    middleware(request, next).await
}

/// A router wrapped in its interface's middleware chain.
pub struct Pipeline {
    interface: Interface,
    stages: Vec<&'static str>,
    handler: Router,
}

impl Pipeline {
    /// Fold `stages` (outermost first) onto `router`.
    pub fn assemble(interface: Interface, router: Router, stages: Vec<Stage>) -> Self {
        let names = stages.iter().map(Stage::name).collect();
        let handler = stages
            .into_iter()
            .rev()
            .fold(router, |router, stage| stage.wrap(router));
        Self {
            interface,
            stages: names,
            handler,
        }
    }

    /// Stage names, outermost first.
    pub fn stages(&self) -> &[&'static str] {
        &self.stages
    }

    pub fn has_security_gate(&self) -> bool {
        self.stages.first() == Some(&"reject_insecure")
    }

    pub fn into_router(self) -> Router {
        self.handler
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("interface", &self.interface)
            .field("stages", &self.stages)
            .finish()
    }
}

/// Builds the pipeline of each interface. Composition never fails.
#[derive(Clone)]
pub struct MiddlewareComposer {
    config: LiveConfig,
    locator: ServiceLocator,
    whitelist: Arc<[String]>,
}

impl MiddlewareComposer {
    pub fn new(config: LiveConfig, locator: ServiceLocator, whitelist: Vec<String>) -> Self {
        Self {
            config,
            locator,
            whitelist: Arc::from(whitelist),
        }
    }

    pub fn compose(&self, router: Router, interface: Interface, security_gate_required: bool) -> Pipeline {
        let config = self.config.load();
        let mut stages = Vec::with_capacity(4 + self.locator.http_middlewares().len());

        if security_gate_required {
            let tls = config.tls(interface);
            stages.push(Stage::RejectInsecure(InsecureGate::new(
                tls.enabled,
                &tls.allow_termination_from,
            )));
        }
        stages.push(Stage::Cors(ContextualCors::new(interface, self.config.clone())));
        stages.extend(self.locator.http_middlewares().iter().cloned().map(Stage::Custom));
        stages.push(Stage::AccessLog(AccessLog::for_interface(&config, interface)));
        stages.push(Stage::Metrics(MetricsCollector::new(interface, self.whitelist.clone())));

        let pipeline = Pipeline::assemble(interface, router, stages);
        tracing::debug!(interface = %interface, stages = ?pipeline.stages(), "Pipeline composed");
        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use crate::config::ServeConfig;
    use crate::routing::paths::whitelisted_paths;

    fn composer(config: ServeConfig, locator: ServiceLocator) -> MiddlewareComposer {
        MiddlewareComposer::new(LiveConfig::new(config), locator, whitelisted_paths())
    }

    #[test]
    fn stage_order_is_fixed() {
        let locator = ServiceLocator::new()
            .with_middleware(|req, next: Next| next.run(req))
            .with_middleware(|req, next: Next| next.run(req));
        let pipeline = composer(ServeConfig::default(), locator).compose(Router::new(), Interface::Admin, true);
        assert_eq!(
            pipeline.stages(),
            &["reject_insecure", "cors", "service_locator", "service_locator", "access_log", "metrics"]
        );
        assert!(pipeline.has_security_gate());
    }

    #[test]
    fn gate_omitted_when_not_required() {
        let pipeline = composer(ServeConfig::default(), ServiceLocator::new()).compose(
            Router::new(),
            Interface::Admin,
            false,
        );
        assert!(!pipeline.has_security_gate());
        assert_eq!(pipeline.stages(), &["cors", "access_log", "metrics"]);
    }

    #[tokio::test]
    async fn custom_middlewares_run_in_registration_order() {
        let locator = ServiceLocator::new()
            .with_middleware(|mut req: Request, next: Next| async move {
                req.headers_mut().append("x-order", "first".parse().unwrap());
                next.run(req).await
            })
            .with_middleware(|mut req: Request, next: Next| async move {
                req.headers_mut().append("x-order", "second".parse().unwrap());
                next.run(req).await
            });
        let router = Router::new().route(
            "/order",
            get(|req: Request| async move {
                req.headers()
                    .get_all("x-order")
                    .iter()
                    .filter_map(|v| v.to_str().ok())
                    .collect::<Vec<_>>()
                    .join(",")
            }),
        );

        let handler = composer(ServeConfig::default(), locator)
            .compose(router, Interface::Public, false)
            .into_router();
        let response = handler
            .oneshot(axum::http::Request::get("/order").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(&body[..], b"first,second");
    }

    #[tokio::test]
    async fn gate_rejects_plaintext_when_tls_enabled() {
        let mut config = ServeConfig::default();
        config.serve.tls.enabled = true;
        let router = Router::new().route("/clients", get(|| async { "ok" }));

        let handler = composer(config, ServiceLocator::new())
            .compose(router, Interface::Admin, true)
            .into_router();
        let response = handler
            .oneshot(axum::http::Request::get("/clients").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
