//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServeConfig (validated, immutable)
//!     → live.rs (ArcSwap shared by all subsystems)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap inside LiveConfig
//!     → per-request readers (CORS) observe new config
//! ```
//!
//! # Design Decisions
//! - Listeners and pipelines are built once from the startup snapshot
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod live;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use live::LiveConfig;
pub use loader::{load_config, ConfigError};
pub use schema::{
    CorsConfig, Interface, InterfaceConfig, LogConfig, PemSource, ServeConfig, SocketPermission,
    TlsConfig, TracingConfig,
};
