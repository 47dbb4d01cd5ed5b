//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms, Prometheus exposition)
//!     → tracing.rs (request spans when a tracer is loaded)
//!
//! Consumers:
//!     → Log aggregation (stdout, text or JSON)
//!     → /admin/metrics/prometheus scrape endpoint
//!     → Tracing backend named by `tracing.provider`
//! ```
//!
//! # Design Decisions
//! - The metrics registry is shared by both serving tasks
//! - Tracing is optional and checked at runtime, not compiled in or out

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use metrics::{AnalyticsIdentity, MetricsRegistry};
pub use self::tracing::Tracer;
