//! Interface bootstrap.
//!
//! Builds routers, pipelines and listen targets for both interfaces, even
//! when only one of them is served.

use std::sync::Arc;

use crate::build_info::BuildInfo;
use crate::config::{Interface, LiveConfig, ServeConfig};
use crate::error::ServeError;
use crate::health::{self, HealthState};
use crate::http::{InterfaceSpec, MiddlewareComposer, ServiceLocator};
use crate::net::{ListenTarget, TransportFlags, TransportMode, TUNNEL_SERVICE_ENV};
use crate::observability::{AnalyticsIdentity, MetricsRegistry};
use crate::routing::{paths, NoRoutes, RouteRegistrar};

/// Which interfaces a command serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeMode {
    All,
    Admin,
    Public,
}

impl ServeMode {
    pub fn interfaces(&self) -> &'static [Interface] {
        match self {
            ServeMode::All => &Interface::ALL,
            ServeMode::Admin => &[Interface::Admin],
            ServeMode::Public => &[Interface::Public],
        }
    }

    /// Serving a single interface in this process.
    pub fn is_standalone(&self) -> bool {
        !matches!(self, ServeMode::All)
    }
}

/// Runtime inputs of the serve command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    pub mode: ServeMode,
    pub tunnel_mode: bool,
    pub tunnel_service: Option<String>,
}

impl CommandContext {
    pub fn new(mode: ServeMode, tunnel_mode: bool, tunnel_service: Option<String>) -> Self {
        Self {
            mode,
            tunnel_mode,
            tunnel_service,
        }
    }

    /// Read the tunnel service name from the process environment.
    pub fn from_env(mode: ServeMode, tunnel_mode: bool) -> Self {
        Self::new(mode, tunnel_mode, std::env::var(TUNNEL_SERVICE_ENV).ok())
    }

    fn flags(&self, interface: Interface) -> TransportFlags {
        TransportFlags::new(interface, self.tunnel_mode, self.tunnel_service.clone())
    }
}

/// Per-interface artifacts produced by [`Bootstrapper::setup`].
#[derive(Debug)]
pub struct SetupArtifacts {
    pub admin: InterfaceSpec,
    pub public: InterfaceSpec,
}

impl SetupArtifacts {
    /// Specs of the interfaces `mode` serves, admin first.
    pub fn select(self, mode: ServeMode) -> Vec<InterfaceSpec> {
        match mode {
            ServeMode::All => vec![self.admin, self.public],
            ServeMode::Admin => vec![self.admin],
            ServeMode::Public => vec![self.public],
        }
    }
}

pub struct Bootstrapper {
    config: LiveConfig,
    build: Arc<BuildInfo>,
    registrar: Arc<dyn RouteRegistrar>,
    locator: ServiceLocator,
    metrics: MetricsRegistry,
}

impl Bootstrapper {
    pub fn new(config: LiveConfig, build: Arc<BuildInfo>, metrics: MetricsRegistry) -> Self {
        Self {
            config,
            build,
            registrar: Arc::new(NoRoutes),
            locator: ServiceLocator::new(),
            metrics,
        }
    }

    pub fn with_registrar(mut self, registrar: Arc<dyn RouteRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    pub fn with_locator(mut self, locator: ServiceLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn setup(&self, context: &CommandContext) -> Result<SetupArtifacts, ServeError> {
        let config = self.config.load();

        if context.mode.is_standalone() && config.is_memory_dsn() {
            return Err(ServeError::configuration(
                "dsn=memory is not supported when serving a single interface; \
                 use `serve all` or configure a persistent database",
            ));
        }

        tracing::info!("{}", self.build.banner());
        let identity = AnalyticsIdentity::new(&config, &self.build);
        tracing::info!(
            service = identity.service,
            cluster_id = %identity.cluster_id,
            is_development = identity.is_development,
            build_version = %identity.build_version,
            build_hash = %identity.build_hash,
            build_time = %identity.build_time,
            "Analytics identity"
        );

        let health = HealthState {
            build: self.build.clone(),
            metrics: self.metrics.clone(),
        };
        let admin_router = self
            .registrar
            .register_admin(health::router(Interface::Admin, health.clone()));
        let public_router = self
            .registrar
            .register_public(health::router(Interface::Public, health));
        for interface in Interface::ALL {
            self.metrics.register_router(interface);
        }

        let composer = MiddlewareComposer::new(
            self.config.clone(),
            self.locator.clone(),
            paths::whitelisted_paths(),
        );
        let spec = |interface: Interface, router: axum::Router| {
            let target = ListenTarget::from_config(&config, interface);
            let flags = context.flags(interface);
            let tls_enabled = config.tls(interface).enabled;
            let mode = TransportMode::select(&target, &flags, tls_enabled);
            let pipeline = composer.compose(router, interface, mode.requires_security_gate());
            tracing::debug!(interface = %interface, target = %target, transport = %mode, "Interface prepared");
            InterfaceSpec {
                interface,
                pipeline,
                target,
                flags,
                mode,
                tls_enabled,
            }
        };

        Ok(SetupArtifacts {
            admin: spec(Interface::Admin, admin_router),
            public: spec(Interface::Public, public_router),
        })
    }
}

/// Worker thread count derived from the CPU quota, when enabled.
pub fn worker_threads(config: &ServeConfig) -> Option<usize> {
    config.auto_max_procs_enabled().then(num_cpus::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bootstrapper(config: ServeConfig) -> Bootstrapper {
        Bootstrapper::new(
            LiveConfig::new(config),
            Arc::new(BuildInfo::current()),
            MetricsRegistry::detached(),
        )
    }

    #[test]
    fn memory_dsn_rejected_for_single_interface() {
        let boot = bootstrapper(ServeConfig::default());
        for mode in [ServeMode::Admin, ServeMode::Public] {
            let err = boot.setup(&CommandContext::new(mode, false, None)).unwrap_err();
            assert!(matches!(err, ServeError::Configuration(_)));
        }
        assert!(boot.setup(&CommandContext::new(ServeMode::All, false, None)).is_ok());
    }

    #[test]
    fn both_interfaces_built_and_registered() {
        let mut config = ServeConfig::default();
        config.dsn = "postgres://db/auth".into();
        let boot = bootstrapper(config);

        let artifacts = boot
            .setup(&CommandContext::new(ServeMode::Admin, false, None))
            .unwrap();
        assert_eq!(artifacts.admin.interface, Interface::Admin);
        assert_eq!(artifacts.public.interface, Interface::Public);
        assert!(boot.metrics.is_registered(Interface::Admin));
        assert!(boot.metrics.is_registered(Interface::Public));

        let selected = artifacts.select(ServeMode::Admin);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].interface, Interface::Admin);
    }

    #[test]
    fn gate_follows_transport() {
        let mut config = ServeConfig::default();
        config.serve.admin.host = "unix:/tmp/admin.sock".into();
        let artifacts = bootstrapper(config)
            .setup(&CommandContext::new(ServeMode::All, true, Some("svc-x".into())))
            .unwrap();

        assert_eq!(artifacts.admin.mode, TransportMode::UnixSocket);
        assert!(!artifacts.admin.pipeline.has_security_gate());
        assert_eq!(artifacts.public.mode, TransportMode::PlainTcp);
        assert!(artifacts.public.pipeline.has_security_gate());
    }

    #[test]
    fn tunnel_only_applies_to_admin() {
        let artifacts = bootstrapper(ServeConfig::default())
            .setup(&CommandContext::new(ServeMode::All, true, Some("svc-x".into())))
            .unwrap();
        assert_eq!(artifacts.admin.mode, TransportMode::OverlayTunnel);
        assert_eq!(artifacts.public.mode, TransportMode::PlainTcp);
    }

    #[test]
    fn worker_threads_only_when_enabled() {
        let mut config = ServeConfig::default();
        assert_eq!(worker_threads(&config), None);
        config.serve.cgroups.auto_max_procs = true;
        assert!(worker_threads(&config).unwrap() >= 1);
    }
}
