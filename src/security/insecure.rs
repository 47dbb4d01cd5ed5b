//! Reject-insecure-request gate.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::routing::paths;

/// How the connection carrying a request was secured.
///
/// Inserted as a request extension by the serve coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSecurity {
    Tls,
    Plain,
}

/// An IP network in CIDR notation, or a single address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid IP range {0:?}")]
pub struct IpRangeError(String);

impl IpRange {
    pub fn contains(&self, ip: IpAddr) -> bool {
        // v4-mapped v6 peers are compared as v4
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            v4 => v4,
        };
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn mask32(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask128(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for IpRange {
    type Err = IpRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || IpRangeError(s.to_string());
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let network: IpAddr = addr.trim().parse().map_err(|_| err())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.trim().parse::<u8>().map_err(|_| err())?,
            None => max,
        };
        if prefix > max {
            return Err(err());
        }
        Ok(Self { network, prefix })
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// State of the gate for one interface.
#[derive(Debug, Clone)]
pub struct InsecureGate {
    tls_enabled: bool,
    trusted: Arc<[IpRange]>,
}

impl InsecureGate {
    /// Build the gate. Ranges that fail to parse are skipped with a warning;
    /// validation reports them before this point.
    pub fn new(tls_enabled: bool, allow_termination_from: &[String]) -> Self {
        let trusted = allow_termination_from
            .iter()
            .filter_map(|range| match range.parse::<IpRange>() {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring TLS termination range");
                    None
                }
            })
            .collect();
        Self {
            tls_enabled,
            trusted,
        }
    }

    fn check(
        &self,
        security: Option<TransportSecurity>,
        path: &str,
        peer: Option<IpAddr>,
        forwarded_proto: Option<&str>,
    ) -> Result<(), &'static str> {
        if security == Some(TransportSecurity::Tls) || !self.tls_enabled || paths::is_probe(path) {
            return Ok(());
        }
        let Some(peer) = peer else {
            return Err("remote address unknown");
        };
        if !self.trusted.iter().any(|range| range.contains(peer)) {
            return Err("remote address is not allowed to terminate TLS");
        }
        if !forwarded_proto.is_some_and(|p| p.eq_ignore_ascii_case("https")) {
            return Err("X-Forwarded-Proto header is missing or not https");
        }
        Ok(())
    }
}

/// Middleware rejecting plaintext requests on TLS-enabled interfaces unless
/// a trusted proxy terminated TLS for them.
pub async fn reject_insecure_requests(
    State(gate): State<InsecureGate>,
    request: Request,
    next: Next,
) -> Response {
    let security = request.extensions().get::<TransportSecurity>().copied();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let forwarded_proto = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok());

    match gate.check(security, request.uri().path(), peer, forwarded_proto) {
        Ok(()) => next.run(request).await,
        Err(reason) => {
            tracing::warn!(
                path = %request.uri().path(),
                peer = ?peer,
                reason,
                "Rejected insecure request"
            );
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "cannot serve request over insecure http",
                    "error_description": reason,
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn range_membership() {
        let range: IpRange = "10.0.0.0/8".parse().unwrap();
        assert!(range.contains(ip("10.20.30.40")));
        assert!(!range.contains(ip("11.0.0.1")));
        assert!(range.contains(ip("::ffff:10.1.1.1")));

        let single: IpRange = "127.0.0.1".parse().unwrap();
        assert_eq!(single.to_string(), "127.0.0.1/32");
        assert!(single.contains(ip("127.0.0.1")));
        assert!(!single.contains(ip("127.0.0.2")));

        let v6: IpRange = "fd00::/8".parse().unwrap();
        assert!(v6.contains(ip("fd12::1")));

        let any: IpRange = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains(ip("8.8.8.8")));
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        assert!("10.0.0.0/33".parse::<IpRange>().is_err());
        assert!("not-an-ip".parse::<IpRange>().is_err());
        assert!("10.0.0.0/x".parse::<IpRange>().is_err());
    }

    #[test]
    fn gate_passes_when_tls_disabled_or_request_secure() {
        let disabled = InsecureGate::new(false, &[]);
        assert!(disabled.check(Some(TransportSecurity::Plain), "/x", None, None).is_ok());

        let enabled = InsecureGate::new(true, &[]);
        assert!(enabled.check(Some(TransportSecurity::Tls), "/x", None, None).is_ok());
        assert!(enabled.check(Some(TransportSecurity::Plain), "/health/alive", None, None).is_ok());
        assert!(enabled.check(Some(TransportSecurity::Plain), "/x", Some(ip("10.0.0.1")), None).is_err());
    }

    #[test]
    fn gate_accepts_trusted_terminator() {
        let gate = InsecureGate::new(true, &["10.0.0.0/8".to_string()]);
        let peer = Some(ip("10.0.0.7"));
        assert!(gate.check(Some(TransportSecurity::Plain), "/x", peer, Some("https")).is_ok());
        assert!(gate.check(Some(TransportSecurity::Plain), "/x", peer, Some("http")).is_err());
        assert!(gate
            .check(Some(TransportSecurity::Plain), "/x", Some(ip("192.168.0.1")), Some("https"))
            .is_err());
    }
}
