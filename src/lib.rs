//! Serve orchestration library.
//!
//! Binds the admin and public HTTP interfaces to their listeners, wraps
//! each router in its middleware pipeline and serves both concurrently
//! until shutdown.

pub mod build_info;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use build_info::BuildInfo;
pub use config::schema::ServeConfig;
pub use error::ServeError;
pub use http::ServeCoordinator;
pub use lifecycle::{Bootstrapper, Shutdown};
