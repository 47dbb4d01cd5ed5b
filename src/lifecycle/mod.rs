//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     DSN guard → banner → routers → pipelines → InterfaceSpecs
//!
//! Shutdown (shutdown.rs):
//!     Trigger → serving tasks stop accepting → drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Both interfaces are always built, even when one is served
//! - A fatal error in one serving task triggers shutdown of the others
//! - Shutdown has timeout: remaining connections are closed after the drain deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::{worker_threads, Bootstrapper, CommandContext, ServeMode, SetupArtifacts};
