//! Listen targets and transport mode selection.

use std::fmt;
use std::path::PathBuf;

use crate::config::schema::UNIX_SOCKET_PREFIX;
use crate::config::{Interface, ServeConfig, SocketPermission};

/// Environment variable naming the overlay tunnel service.
pub const TUNNEL_SERVICE_ENV: &str = "TUNNEL_SERVICE";

/// Where an interface listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenTarget {
    /// `host:port`, a filesystem path (optionally `unix:`-prefixed), or a
    /// symbolic service name.
    pub address: String,
    pub permission: Option<SocketPermission>,
}

impl ListenTarget {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            permission: None,
        }
    }

    pub fn with_permission(mut self, permission: Option<SocketPermission>) -> Self {
        self.permission = permission;
        self
    }

    pub fn from_config(config: &ServeConfig, interface: Interface) -> Self {
        Self::new(config.listen_address(interface))
            .with_permission(config.socket_permission(interface).cloned())
    }

    /// Filesystem path when this target names a socket file.
    pub fn socket_path(&self) -> Option<PathBuf> {
        if let Some(path) = self.address.strip_prefix(UNIX_SOCKET_PREFIX) {
            return Some(PathBuf::from(path));
        }
        self.address
            .starts_with('/')
            .then(|| PathBuf::from(&self.address))
    }

    pub fn is_unix_socket(&self) -> bool {
        self.socket_path().is_some()
    }

    /// Socket address for TCP binding; an empty host binds all interfaces.
    pub fn tcp_address(&self) -> String {
        match self.address.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.address.clone(),
        }
    }
}

impl fmt::Display for ListenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Runtime inputs to listener selection besides the target itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFlags {
    pub interface: Interface,
    /// The tunnel-mode CLI flag.
    pub tunnel_mode: bool,
    /// Value of [`TUNNEL_SERVICE_ENV`], if set and non-empty.
    pub tunnel_service: Option<String>,
}

impl TransportFlags {
    pub fn new(interface: Interface, tunnel_mode: bool, tunnel_service: Option<String>) -> Self {
        Self {
            interface,
            tunnel_mode,
            tunnel_service: tunnel_service.filter(|s| !s.is_empty()),
        }
    }

    /// Read the tunnel service name from the process environment.
    pub fn from_env(interface: Interface, tunnel_mode: bool) -> Self {
        Self::new(interface, tunnel_mode, std::env::var(TUNNEL_SERVICE_ENV).ok())
    }

    /// Tunnelling is only ever applied to the admin interface.
    pub fn wants_tunnel(&self) -> bool {
        self.tunnel_mode && self.interface == Interface::Admin
    }
}

/// Concrete network mechanism backing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    UnixSocket,
    PlainTcp,
    TlsTcp,
    OverlayTunnel,
}

impl TransportMode {
    /// Select the transport for an interface. Evaluated once at bootstrap.
    pub fn select(target: &ListenTarget, flags: &TransportFlags, tls_enabled: bool) -> Self {
        if target.is_unix_socket() {
            TransportMode::UnixSocket
        } else if flags.wants_tunnel() {
            TransportMode::OverlayTunnel
        } else if tls_enabled {
            TransportMode::TlsTcp
        } else {
            TransportMode::PlainTcp
        }
    }

    /// Whether the reject-insecure-request gate guards this transport.
    pub fn requires_security_gate(&self) -> bool {
        !matches!(self, TransportMode::UnixSocket)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::UnixSocket => "unix_socket",
            TransportMode::PlainTcp => "plain_tcp",
            TransportMode::TlsTcp => "tls_tcp",
            TransportMode::OverlayTunnel => "overlay_tunnel",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
