//! TLS certificate acquisition and context construction.

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use axum::serve::Listener;
use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use base64::Engine;
use dashmap::DashMap;
use tokio::task::JoinSet;

use crate::config::{Interface, PemSource, ServeConfig};
use crate::error::ServeError;

/// DER encoded certificate chain and private key.
#[derive(Clone)]
pub struct TlsMaterial {
    pub cert_chain: Vec<Vec<u8>>,
    pub key: Vec<u8>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("certificates", &self.cert_chain.len())
            .finish_non_exhaustive()
    }
}

/// Supplies certificates for an interface. May be slow on first call.
#[async_trait]
pub trait CertificateProvider: Send + Sync {
    async fn certificates(&self, interface: Interface) -> Result<TlsMaterial, ServeError>;
}

/// Loads configured PEM material, or generates and caches a self-signed
/// certificate per interface when none is configured.
pub struct ConfiguredCertificateProvider {
    config: ServeConfig,
    generated: DashMap<Interface, TlsMaterial>,
}

impl ConfiguredCertificateProvider {
    pub fn new(config: ServeConfig) -> Self {
        Self {
            config,
            generated: DashMap::new(),
        }
    }

    fn self_signed(&self, interface: Interface) -> Result<TlsMaterial, ServeError> {
        if let Some(material) = self.generated.get(&interface) {
            return Ok(material.clone());
        }

        let mut names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        if let Some(host) = url::Url::parse(self.config.issuer_url())
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
        {
            if !names.contains(&host) {
                names.push(host);
            }
        }

        tracing::warn!(
            interface = %interface,
            names = ?names,
            "No TLS certificate configured, generating a self-signed certificate; do not use it in production"
        );
        let certified = rcgen::generate_simple_self_signed(names).map_err(|e| ServeError::Tls {
            interface,
            reason: format!("failed to generate self-signed certificate: {e}"),
        })?;
        let material = TlsMaterial {
            cert_chain: vec![certified.cert.der().to_vec()],
            key: certified.key_pair.serialize_der(),
        };
        self.generated.insert(interface, material.clone());
        Ok(material)
    }
}

#[async_trait]
impl CertificateProvider for ConfiguredCertificateProvider {
    async fn certificates(&self, interface: Interface) -> Result<TlsMaterial, ServeError> {
        let tls = self.config.tls(interface);
        if !tls.has_material() {
            return self.self_signed(interface);
        }

        let tls_err = |reason: String| ServeError::Tls { interface, reason };
        let cert = read_pem(&tls.cert).await.map_err(|e| tls_err(format!("certificate: {e}")))?;
        let key = read_pem(&tls.key).await.map_err(|e| tls_err(format!("private key: {e}")))?;
        let material = parse_pem(&cert, &key).map_err(tls_err)?;

        tracing::info!(
            interface = %interface,
            certificates = material.cert_chain.len(),
            "Loaded TLS certificate"
        );
        Ok(material)
    }
}

async fn read_pem(source: &PemSource) -> Result<Vec<u8>, String> {
    if let Some(path) = &source.path {
        return read_file(path).await;
    }
    match &source.base64 {
        Some(encoded) => base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| format!("invalid base64: {e}")),
        None => Err("not configured".to_string()),
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>, String> {
    tokio::fs::read(path)
        .await
        .map_err(|e| format!("cannot read {}: {e}", path.display()))
}

/// Decode a PEM certificate chain and private key into DER.
pub fn parse_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<TlsMaterial, String> {
    let mut cert_reader = cert_pem;
    let cert_chain = rustls_pemfile::certs(&mut cert_reader)
        .map(|c| c.map(|c| c.to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid certificate PEM: {e}"))?;
    if cert_chain.is_empty() {
        return Err("certificate chain is empty".to_string());
    }

    let mut key_reader = key_pem;
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| format!("invalid private key PEM: {e}"))?
        .ok_or_else(|| "no private key found".to_string())?;

    Ok(TlsMaterial {
        cert_chain,
        key: key.secret_der().to_vec(),
    })
}

/// Build the rustls server context for an interface.
pub async fn tls_context(interface: Interface, material: TlsMaterial) -> Result<RustlsConfig, ServeError> {
    RustlsConfig::from_der(material.cert_chain, material.key)
        .await
        .map_err(|e| ServeError::Tls {
            interface,
            reason: e.to_string(),
        })
}

type Handshake<L> = (
    std::io::Result<<RustlsAcceptor as Accept<<L as Listener>::Io, ()>>::Stream>,
    <L as Listener>::Addr,
);

/// Wraps a listener and completes the TLS handshake before handing
/// connections to the HTTP engine.
///
/// Handshakes run as separate tasks so a slow client cannot stall the
/// accept loop.
pub struct TlsListener<L: Listener>
where
    RustlsAcceptor: Accept<L::Io, ()>,
{
    inner: L,
    acceptor: RustlsAcceptor,
    handshakes: JoinSet<Handshake<L>>,
}

impl<L: Listener> TlsListener<L>
where
    RustlsAcceptor: Accept<L::Io, ()>,
{
    pub fn new(inner: L, config: RustlsConfig) -> Self {
        Self {
            inner,
            acceptor: RustlsAcceptor::new(config),
            handshakes: JoinSet::new(),
        }
    }
}

impl<L> Listener for TlsListener<L>
where
    L: Listener,
    L::Addr: Debug + Send + 'static,
    RustlsAcceptor: Accept<L::Io, ()>,
    <RustlsAcceptor as Accept<L::Io, ()>>::Stream:
        tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    <RustlsAcceptor as Accept<L::Io, ()>>::Future: Send + 'static,
{
    type Io = <RustlsAcceptor as Accept<L::Io, ()>>::Stream;
    type Addr = L::Addr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            tokio::select! {
                (io, addr) = self.inner.accept() => {
                    let handshake = self.acceptor.accept(io, ());
                    self.handshakes.spawn(async move {
                        (handshake.await.map(|(stream, _)| stream), addr)
                    });
                }
                Some(joined) = self.handshakes.join_next(), if !self.handshakes.is_empty() => {
                    match joined {
                        Ok((Ok(stream), addr)) => return (stream, addr),
                        Ok((Err(e), addr)) => {
                            tracing::debug!(peer = ?addr, error = %e, "TLS handshake failed");
                        }
                        Err(e) => tracing::warn!(error = %e, "TLS handshake task failed"),
                    }
                }
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}
