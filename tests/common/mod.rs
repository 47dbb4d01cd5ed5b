//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::{TcpListener, TcpStream, UnixStream};
use tokio::sync::mpsc;

use serve_orchestrator::config::LiveConfig;
use serve_orchestrator::lifecycle::{CommandContext, ServeMode};
use serve_orchestrator::net::tunnel::{BoxedStream, TunnelError};
use serve_orchestrator::net::{ListenOptions, ListenerFactory, TunnelAcceptor};
use serve_orchestrator::observability::MetricsRegistry;
use serve_orchestrator::{Bootstrapper, BuildInfo, ServeConfig};

/// A port that was free a moment ago.
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Config with a persistent-looking DSN so single-interface modes pass.
pub fn config() -> ServeConfig {
    let mut config = ServeConfig::default();
    config.dsn = "postgres://auth@db/auth".into();
    config.urls.self_issuer = "http://127.0.0.1/".into();
    config
}

pub fn bootstrapper(live: LiveConfig) -> Bootstrapper {
    Bootstrapper::new(live, Arc::new(BuildInfo::current()), MetricsRegistry::detached())
}

pub fn context(mode: ServeMode) -> CommandContext {
    CommandContext::new(mode, false, None)
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met in time");
}

pub async fn tcp_is_up(port: u16) -> bool {
    TcpStream::connect(("127.0.0.1", port)).await.is_ok()
}

/// Send one HTTP/1.1 request over an already connected stream.
pub async fn request_over<S>(stream: S, path: &str) -> (u16, String)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let request = Request::get(path)
        .header("host", "localhost")
        .body(Body::empty())
        .unwrap();
    let response: Response<hyper::body::Incoming> = sender.send_request(request).await.unwrap();
    let status = response.status().as_u16();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).into_owned())
}

/// Log output captured for the current thread while the guard lives.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let logs = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub async fn unix_get(path: &Path, uri: &str) -> (u16, String) {
    let stream = UnixStream::connect(path).await.unwrap();
    request_over(stream, uri).await
}

/// Tunnel backend that records listen calls and hands out in-memory
/// connections pushed by the test.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    calls: Arc<Mutex<Vec<(String, ListenOptions)>>>,
    connections: Arc<Mutex<Option<mpsc::Sender<BoxedStream>>>>,
}

impl RecordingFactory {
    pub fn calls(&self) -> Vec<(String, ListenOptions)> {
        self.calls.lock().unwrap().clone()
    }

    /// Open a connection to the listener created by the last `listen`.
    pub async fn connect(&self) -> DuplexStream {
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.deliver(Box::new(server)).await;
        client
    }

    /// Forward every connection accepted on `front` into the tunnel, so
    /// ordinary TCP clients can reach the tunnel listener.
    pub fn relay_from(&self, front: TcpListener) {
        let factory = self.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = front.accept().await {
                factory.deliver(Box::new(stream)).await;
            }
        });
    }

    async fn deliver(&self, stream: BoxedStream) {
        let sender = self.connections.lock().unwrap().clone().expect("no listener yet");
        sender.send(stream).await.unwrap();
    }
}

struct ChannelAcceptor(mpsc::Receiver<BoxedStream>);

#[async_trait]
impl TunnelAcceptor for ChannelAcceptor {
    async fn accept(&mut self) -> std::io::Result<(BoxedStream, String)> {
        match self.0.recv().await {
            Some(stream) => Ok((stream, "peer".to_string())),
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl ListenerFactory for RecordingFactory {
    async fn listen(
        &self,
        service: &str,
        options: ListenOptions,
    ) -> Result<Box<dyn TunnelAcceptor>, TunnelError> {
        self.calls.lock().unwrap().push((service.to_string(), options));
        let (tx, rx) = mpsc::channel(8);
        *self.connections.lock().unwrap() = Some(tx);
        Ok(Box::new(ChannelAcceptor(rx)))
    }
}
