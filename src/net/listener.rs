//! Listener resolution.
//!
//! # Responsibilities
//! - Select the transport for an interface from its target and flags
//! - Bind filesystem sockets and apply ownership/mode bits
//! - Request overlay tunnel listeners from the tunnel backend
//! - Bind TCP listeners
//!
//! No retries: a failure here is fatal to the interface's serving task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::{TcpListener, UnixListener};

use crate::config::SocketPermission;
use crate::error::ServeError;
use crate::net::target::{ListenTarget, TransportFlags, TransportMode, TUNNEL_SERVICE_ENV};
use crate::net::tunnel::{ListenOptions, ListenerFactory, TunnelListener};

/// A bound listener of one of the supported transports.
pub enum BoundListener {
    Unix { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
    Tunnel(TunnelListener),
}

impl BoundListener {
    /// Transport of this listener given whether TLS wraps it.
    pub fn mode(&self, tls: bool) -> TransportMode {
        match self {
            BoundListener::Unix { .. } => TransportMode::UnixSocket,
            BoundListener::Tunnel(_) => TransportMode::OverlayTunnel,
            BoundListener::Tcp(_) if tls => TransportMode::TlsTcp,
            BoundListener::Tcp(_) => TransportMode::PlainTcp,
        }
    }

    /// Human readable local address.
    pub fn describe(&self) -> String {
        match self {
            BoundListener::Unix { path, .. } => format!("unix:{}", path.display()),
            BoundListener::Tcp(listener) => listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            BoundListener::Tunnel(listener) => format!("tunnel:{}", listener.service()),
        }
    }
}

impl std::fmt::Debug for BoundListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BoundListener").field(&self.describe()).finish()
    }
}

/// Turns listen targets into bound listeners.
#[derive(Clone)]
pub struct ListenerResolver {
    tunnels: Arc<dyn ListenerFactory>,
    options: ListenOptions,
}

impl ListenerResolver {
    pub fn new(tunnels: Arc<dyn ListenerFactory>) -> Self {
        Self {
            tunnels,
            options: ListenOptions::default(),
        }
    }

    /// Resolve and bind the listener for `target`.
    pub async fn resolve(
        &self,
        target: &ListenTarget,
        flags: &TransportFlags,
    ) -> Result<BoundListener, ServeError> {
        if let Some(path) = target.socket_path() {
            tracing::info!(interface = %flags.interface, path = %path.display(), transport = %TransportMode::UnixSocket, "Setting up listener");
            return bind_unix(&path, target.permission.as_ref());
        }

        if flags.wants_tunnel() {
            let service = flags.tunnel_service.clone().ok_or_else(|| {
                ServeError::configuration(format!(
                    "tunnel mode requested but the {TUNNEL_SERVICE_ENV} environment variable is not set"
                ))
            })?;
            tracing::info!(
                interface = %flags.interface,
                service = %service,
                transport = %TransportMode::OverlayTunnel,
                connect_timeout_secs = self.options.connect_timeout.as_secs(),
                max_connections = self.options.max_connections,
                "Setting up listener"
            );
            let acceptor = self
                .tunnels
                .listen(&service, self.options)
                .await
                .map_err(|source| ServeError::Transport {
                    service: service.clone(),
                    source,
                })?;
            return Ok(BoundListener::Tunnel(TunnelListener::new(
                acceptor,
                service,
                self.options,
            )));
        }

        let address = target.tcp_address();
        tracing::info!(interface = %flags.interface, address = %address, transport = "tcp", "Setting up listener");
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServeError::Bind {
                address: address.clone(),
                source,
            })?;
        Ok(BoundListener::Tcp(listener))
    }
}

/// Bind a filesystem socket, replacing a stale socket file.
fn bind_unix(path: &Path, permission: Option<&SocketPermission>) -> Result<BoundListener, ServeError> {
    bind_unix_with(path, permission, apply_permission)
}

/// [`bind_unix`] with the ownership/mode step supplied by the caller. The
/// socket file does not outlive a failed permission step.
fn bind_unix_with<F>(
    path: &Path,
    permission: Option<&SocketPermission>,
    apply: F,
) -> Result<BoundListener, ServeError>
where
    F: FnOnce(&Path, &SocketPermission) -> std::io::Result<()>,
{
    let bind_err = |source| ServeError::Bind {
        address: format!("unix:{}", path.display()),
        source,
    };

    if path.exists() {
        std::fs::remove_file(path).map_err(bind_err)?;
    }
    let listener = UnixListener::bind(path).map_err(bind_err)?;

    if let Some(permission) = permission {
        if let Err(source) = apply(path, permission) {
            drop(listener);
            if let Err(e) = std::fs::remove_file(path) {
                tracing::debug!(path = %path.display(), error = %e, "Socket file not removed");
            }
            return Err(ServeError::Permission {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    Ok(BoundListener::Unix {
        listener,
        path: path.to_path_buf(),
    })
}

fn apply_permission(path: &Path, permission: &SocketPermission) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if permission.owner.is_some() || permission.group.is_some() {
        std::os::unix::fs::chown(path, permission.owner, permission.group)?;
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(permission.mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Interface;
    use crate::net::tunnel::UnavailableTunnel;

    fn resolver() -> ListenerResolver {
        ListenerResolver::new(Arc::new(UnavailableTunnel))
    }

    #[tokio::test]
    async fn binds_unix_socket_with_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.sock");
        let target = ListenTarget::new(format!("unix:{}", path.display())).with_permission(Some(
            SocketPermission {
                mode: 0o700,
                ..SocketPermission::default()
            },
        ));

        let listener = resolver()
            .resolve(&target, &TransportFlags::new(Interface::Admin, true, None))
            .await
            .unwrap();
        assert_eq!(listener.mode(true), TransportMode::UnixSocket);

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn stale_socket_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("public.sock");
        std::fs::write(&path, b"").unwrap();

        let target = ListenTarget::new(path.display().to_string());
        let listener = resolver()
            .resolve(&target, &TransportFlags::new(Interface::Public, false, None))
            .await
            .unwrap();
        assert!(matches!(listener, BoundListener::Unix { .. }));
    }

    #[tokio::test]
    async fn failed_permission_removes_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.sock");
        let permission = SocketPermission {
            owner: Some(0),
            ..SocketPermission::default()
        };

        let err = bind_unix_with(&path, Some(&permission), |_, _| {
            Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
        })
        .err()
        .unwrap();
        assert!(matches!(err, ServeError::Permission { path: ref p, .. } if p == &path));
        assert!(!path.exists());

        // The path is free for the next attempt
        let listener = bind_unix(&path, None).unwrap();
        assert!(matches!(listener, BoundListener::Unix { .. }));
    }

    #[tokio::test]
    async fn tunnel_without_service_is_configuration_error() {
        let target = ListenTarget::new("127.0.0.1:0");
        let err = resolver()
            .resolve(&target, &TransportFlags::new(Interface::Admin, true, None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::Configuration(_)));
    }

    #[tokio::test]
    async fn tunnel_backend_failure_is_transport_error() {
        let target = ListenTarget::new("127.0.0.1:0");
        let err = resolver()
            .resolve(
                &target,
                &TransportFlags::new(Interface::Admin, true, Some("svc-x".into())),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::Transport { ref service, .. } if service == "svc-x"));
    }

    #[tokio::test]
    async fn public_ignores_tunnel_flag() {
        let target = ListenTarget::new("127.0.0.1:0");
        let listener = resolver()
            .resolve(&target, &TransportFlags::new(Interface::Public, true, None))
            .await
            .unwrap();
        assert_eq!(listener.mode(false), TransportMode::PlainTcp);
    }

    #[tokio::test]
    async fn port_in_use_is_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = ListenTarget::new(taken.local_addr().unwrap().to_string());
        let err = resolver()
            .resolve(&target, &TransportFlags::new(Interface::Public, false, None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::Bind { .. }));
    }
}
