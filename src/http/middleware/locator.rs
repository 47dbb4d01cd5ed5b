//! Externally registered middleware.

use std::future::Future;
use std::sync::Arc;

use axum::{extract::Request, middleware::Next, response::Response};
use futures_util::future::BoxFuture;

/// Middleware supplied by the embedding application.
pub type HttpMiddleware = Arc<dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync>;

/// Collects middleware registered by the embedding application, applied
/// in registration order right after CORS.
#[derive(Clone, Default)]
pub struct ServiceLocator {
    middlewares: Vec<HttpMiddleware>,
}

impl ServiceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_middleware<F, Fut>(mut self, middleware: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.middlewares
            .push(Arc::new(move |request, next| Box::pin(middleware(request, next))));
        self
    }

    pub fn http_middlewares(&self) -> &[HttpMiddleware] {
        &self.middlewares
    }
}

impl std::fmt::Debug for ServiceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceLocator")
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}
