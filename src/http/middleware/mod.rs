//! Request middleware assembled into each interface's pipeline.

pub mod access_log;
pub mod cors;
pub mod locator;
pub mod metrics;

pub use access_log::{access_log, AccessLog};
pub use cors::{contextual_cors, ContextualCors};
pub use locator::{HttpMiddleware, ServiceLocator};
pub use metrics::{collect_metrics, MetricsCollector};
