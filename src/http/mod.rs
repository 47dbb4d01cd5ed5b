//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! Router (health + registrar routes)
//!     → pipeline.rs (gate, CORS, locator middlewares, access log, metrics)
//!     → server.rs (one serving task per interface, TLS/plain/unix dispatch)
//!     → connections.rs (connection tasks, graceful close, abort at the drain deadline)
//!     → Listener from net::ListenerResolver
//! ```

mod connections;
pub mod middleware;
pub mod pipeline;
pub mod server;

pub use connections::Drained;
pub use middleware::{HttpMiddleware, ServiceLocator};
pub use pipeline::{MiddlewareComposer, Pipeline, Stage};
pub use server::{
    InterfaceSpec, RunSummary, ServeCoordinator, TaskOutcome, TaskState, DRAIN_TIMEOUT_WARNING,
    HTTPS_DISABLED_WARNING,
};
