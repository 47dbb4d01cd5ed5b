//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! orchestrator. All types derive Serde traits for deserialization from
//! config files and every field has a default, so an empty file is valid.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder DSN for non-persistent storage.
pub const MEMORY_DSN: &str = "memory";

/// Prefix marking a host as a filesystem socket path.
pub const UNIX_SOCKET_PREFIX: &str = "unix:";

/// One of the two logically distinct HTTP roles this process exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Admin,
    Public,
}

impl Interface {
    /// Both interfaces, admin first.
    pub const ALL: [Interface; 2] = [Interface::Admin, Interface::Public];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interface::Admin => "admin",
            Interface::Public => "public",
        }
    }

    /// Path prefix under which this interface mounts its routes.
    pub fn path_prefix(&self) -> &'static str {
        match self {
            Interface::Admin => "/admin",
            Interface::Public => "",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Data source name of the persistence layer.
    pub dsn: String,

    /// Public URLs of this deployment.
    pub urls: UrlsConfig,

    /// Listener and transport settings for both interfaces.
    pub serve: ServeSection,

    /// Distributed tracing settings.
    pub tracing: TracingConfig,

    /// Log output settings.
    pub log: LogConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            dsn: MEMORY_DSN.to_string(),
            urls: UrlsConfig::default(),
            serve: ServeSection::default(),
            tracing: TracingConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ServeConfig {
    pub fn interface(&self, interface: Interface) -> &InterfaceConfig {
        match interface {
            Interface::Admin => &self.serve.admin,
            Interface::Public => &self.serve.public,
        }
    }

    /// Address the interface listens on: `host:port` or `unix:/path`.
    pub fn listen_address(&self, interface: Interface) -> String {
        self.interface(interface).listen_on()
    }

    /// Effective TLS settings: the interface block wins over the shared one.
    pub fn tls(&self, interface: Interface) -> &TlsConfig {
        self.interface(interface)
            .tls
            .as_ref()
            .unwrap_or(&self.serve.tls)
    }

    pub fn socket_permission(&self, interface: Interface) -> Option<&SocketPermission> {
        self.interface(interface).socket.as_ref()
    }

    pub fn cors(&self, interface: Interface) -> &CorsConfig {
        &self.interface(interface).cors
    }

    pub fn disable_health_access_log(&self, interface: Interface) -> bool {
        self.interface(interface).request_log.disable_for_health
    }

    pub fn issuer_url(&self) -> &str {
        &self.urls.self_issuer
    }

    pub fn auto_max_procs_enabled(&self) -> bool {
        self.serve.cgroups.auto_max_procs
    }

    pub fn is_memory_dsn(&self) -> bool {
        self.dsn == MEMORY_DSN
    }
}

/// Public URLs.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UrlsConfig {
    /// Issuer URL advertised by the public interface.
    pub self_issuer: String,
}

/// `[serve]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServeSection {
    pub admin: InterfaceConfig,
    pub public: InterfaceConfig,

    /// TLS defaults shared by both interfaces.
    pub tls: TlsConfig,

    /// Time allowed for in-flight requests to finish on shutdown.
    pub shutdown_timeout_secs: u64,

    pub cgroups: CgroupsConfig,
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            admin: InterfaceConfig::with_port(4445),
            public: InterfaceConfig::with_port(4444),
            tls: TlsConfig::default(),
            shutdown_timeout_secs: 5,
            cgroups: CgroupsConfig::default(),
        }
    }
}

/// Per-interface listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterfaceConfig {
    /// Host to bind, empty for all addresses, or `unix:/path/to.sock`.
    pub host: String,

    pub port: u16,

    /// Ownership and mode applied to a filesystem socket.
    pub socket: Option<SocketPermission>,

    /// Overrides `serve.tls` when present.
    pub tls: Option<TlsConfig>,

    pub cors: CorsConfig,

    pub request_log: RequestLogConfig,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self::with_port(0)
    }
}

impl InterfaceConfig {
    fn with_port(port: u16) -> Self {
        Self {
            host: String::new(),
            port,
            socket: None,
            tls: None,
            cors: CorsConfig::default(),
            request_log: RequestLogConfig::default(),
        }
    }

    pub fn listen_on(&self) -> String {
        if self.host.starts_with(UNIX_SOCKET_PREFIX) || self.host.starts_with('/') {
            return self.host.clone();
        }
        if self.host.contains(':') && !self.host.starts_with('[') {
            // IPv6 literal
            return format!("[{}]:{}", self.host, self.port);
        }
        format!("{}:{}", self.host, self.port)
    }
}

/// Filesystem socket permission spec.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SocketPermission {
    /// Numeric owner uid.
    #[serde(default)]
    pub owner: Option<u32>,

    /// Numeric group gid.
    #[serde(default)]
    pub group: Option<u32>,

    /// File mode bits, e.g. `0o755`.
    #[serde(default = "default_socket_mode")]
    pub mode: u32,
}

fn default_socket_mode() -> u32 {
    0o755
}

impl Default for SocketPermission {
    fn default() -> Self {
        Self {
            owner: None,
            group: None,
            mode: default_socket_mode(),
        }
    }
}

/// TLS settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,

    pub cert: PemSource,

    pub key: PemSource,

    /// CIDR ranges allowed to terminate TLS in front of this process.
    pub allow_termination_from: Vec<String>,
}

impl TlsConfig {
    pub fn has_material(&self) -> bool {
        self.cert.is_set() && self.key.is_set()
    }
}

/// Location of PEM encoded material.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PemSource {
    pub path: Option<PathBuf>,
    pub base64: Option<String>,
}

impl PemSource {
    pub fn is_set(&self) -> bool {
        self.path.is_some() || self.base64.is_some()
    }
}

/// CORS policy for one interface.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: Vec::new(),
            allowed_methods: ["GET", "POST", "PUT", "PATCH", "DELETE"]
                .map(String::from)
                .to_vec(),
            allowed_headers: ["Authorization", "Content-Type"].map(String::from).to_vec(),
            exposed_headers: ["Content-Type"].map(String::from).to_vec(),
            allow_credentials: true,
            max_age_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RequestLogConfig {
    /// Skip access log lines for health, version and metrics probes.
    pub disable_for_health: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CgroupsConfig {
    /// Size the worker pool from the container CPU quota.
    pub auto_max_procs: bool,
}

/// Distributed tracing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Tracing backend name; empty disables tracing.
    pub provider: String,

    pub service_name: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            service_name: "serve-orchestrator".to_string(),
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// `text` or `json`.
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}
