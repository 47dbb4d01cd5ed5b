//! Fatal error taxonomy for listener resolution and serving.
//!
//! Every variant ends the serving task that produced it. The binary maps
//! any of them to a non-zero exit status after logging the cause.

use std::path::PathBuf;

use crate::config::Interface;
use crate::net::tunnel::TunnelError;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// A required environment or configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The address or socket could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem socket ownership or mode could not be applied.
    #[error("failed to apply permissions to socket {}: {source}", path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The overlay tunnel backend refused to provide a listener.
    #[error("tunnel transport failed for service {service}: {source}")]
    Transport {
        service: String,
        #[source]
        source: TunnelError,
    },

    /// Certificates could not be obtained or turned into a TLS context.
    #[error("tls setup failed for the {interface} interface: {reason}")]
    Tls { interface: Interface, reason: String },

    /// The HTTP engine stopped with an I/O error.
    #[error("{interface} server failed: {source}")]
    Serve {
        interface: Interface,
        #[source]
        source: std::io::Error,
    },
}

impl ServeError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ServeError::Configuration(message.into())
    }
}
