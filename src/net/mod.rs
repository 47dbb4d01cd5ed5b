//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenTarget + TransportFlags
//!     → target.rs (select TransportMode once per interface)
//!     → listener.rs (bind unix socket / TCP, or ask the tunnel backend)
//!     → tls.rs (optional certificates and rustls context)
//!     → Hand off to the serve coordinator
//!
//! Transport precedence:
//!     filesystem socket → overlay tunnel (admin only) → TCP (+TLS)
//! ```
//!
//! # Design Decisions
//! - Exactly one listener per interface
//! - Bind failures are fatal and never retried
//! - Tunnel connections are bounded by a semaphore

pub mod listener;
pub mod target;
pub mod tls;
pub mod tunnel;

pub use listener::{BoundListener, ListenerResolver};
pub use target::{ListenTarget, TransportFlags, TransportMode, TUNNEL_SERVICE_ENV};
pub use tls::{CertificateProvider, ConfiguredCertificateProvider, TlsListener, TlsMaterial};
pub use tunnel::{ListenOptions, ListenerFactory, TunnelAcceptor, TunnelListener, UnavailableTunnel};
