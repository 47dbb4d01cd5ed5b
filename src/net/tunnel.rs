//! Overlay tunnel transport.
//!
//! The tunnel protocol itself lives behind [`ListenerFactory`]. This module
//! adapts whatever the factory returns into an axum listener and bounds the
//! number of concurrently open tunnel connections.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Error reported by a tunnel backend.
pub type TunnelError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Time a tunnel connection may take to establish.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Concurrent tunnel connections accepted per listener.
pub const MAX_CONNECTIONS: usize = 3;

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenOptions {
    pub connect_timeout: Duration,
    pub max_connections: usize,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            max_connections: MAX_CONNECTIONS,
        }
    }
}

/// Byte stream carried over the tunnel.
pub trait TunnelStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> TunnelStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedStream = Box<dyn TunnelStream>;

/// Accept side of a tunnel service binding.
///
/// `accept` must be cancel safe: the serve loop may drop a pending call.
#[async_trait]
pub trait TunnelAcceptor: Send + 'static {
    /// Wait for the next inbound connection and its peer identity.
    async fn accept(&mut self) -> io::Result<(BoxedStream, String)>;
}

/// Creates listeners on the overlay network.
#[async_trait]
pub trait ListenerFactory: Send + Sync {
    async fn listen(
        &self,
        service: &str,
        options: ListenOptions,
    ) -> Result<Box<dyn TunnelAcceptor>, TunnelError>;
}

/// Factory used when no tunnel backend is linked into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableTunnel;

#[async_trait]
impl ListenerFactory for UnavailableTunnel {
    async fn listen(
        &self,
        service: &str,
        _options: ListenOptions,
    ) -> Result<Box<dyn TunnelAcceptor>, TunnelError> {
        Err(format!("no overlay tunnel backend is available to serve {service:?}").into())
    }
}

/// A tunnel binding that holds one semaphore permit per open connection.
pub struct TunnelListener {
    acceptor: Box<dyn TunnelAcceptor>,
    service: String,
    connection_limit: Arc<Semaphore>,
}

impl TunnelListener {
    pub fn new(acceptor: Box<dyn TunnelAcceptor>, service: impl Into<String>, options: ListenOptions) -> Self {
        Self {
            acceptor,
            service: service.into(),
            connection_limit: Arc::new(Semaphore::new(options.max_connections.max(1))),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    async fn next_stream(&mut self) -> (PermittedStream, String) {
        // Acquire first so a full listener stops pulling connections
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .expect("Semaphore closed unexpectedly");

        loop {
            match self.acceptor.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(
                        service = %self.service,
                        peer = %peer,
                        available_permits = self.connection_limit.available_permits(),
                        "Tunnel connection accepted"
                    );
                    return (
                        PermittedStream {
                            inner: stream,
                            _permit: permit,
                        },
                        peer,
                    );
                }
                Err(e) => {
                    tracing::error!(service = %self.service, error = %e, "Tunnel accept failed");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }
}

impl axum::serve::Listener for TunnelListener {
    type Io = PermittedStream;
    type Addr = String;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        self.next_stream().await
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.service.clone())
    }
}

/// Tunnel stream that releases its connection slot when dropped.
pub struct PermittedStream {
    inner: BoxedStream,
    _permit: OwnedSemaphorePermit,
}

impl AsyncRead for PermittedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PermittedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
