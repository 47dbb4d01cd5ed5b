//! Router capability.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     bootstrap creates empty admin/public axum Routers
//!     → health.rs mounts liveness, readiness, version, metrics routes
//!     → RouteRegistrar (business layer) mounts its routes
//!     → Router handed to the middleware composer
//! ```
//!
//! # Design Decisions
//! - Business routes are opaque here; only the registrar knows them
//! - Path constants live in paths.rs so the metrics whitelist and the
//!   security gate agree on them

pub mod paths;

use axum::Router;

/// Registers application routes on the admin and public routers.
pub trait RouteRegistrar: Send + Sync {
    fn register_admin(&self, router: Router) -> Router;
    fn register_public(&self, router: Router) -> Router;
}

/// Registrar that adds nothing beyond the infrastructure routes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRoutes;

impl RouteRegistrar for NoRoutes {
    fn register_admin(&self, router: Router) -> Router {
        router
    }

    fn register_public(&self, router: Router) -> Router {
        router
    }
}
