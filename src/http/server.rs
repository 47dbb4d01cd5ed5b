//! Serve coordination.
//!
//! # Responsibilities
//! - Spawn one serving task per interface
//! - Obtain certificates and build the TLS context before binding
//! - Resolve the listener and dispatch to unix, TLS or plain serving
//! - Drain in-flight requests on shutdown within a bounded timeout
//! - Wait for every task before returning
//!
//! # Task states
//! ```text
//! Initializing → Binding → Serving → ShuttingDown → Terminated
//!                   └────→ BindFailed → Terminated (fatal)
//! ```
//!
//! A fatal error in any task triggers the shared [`Shutdown`], so sibling
//! interfaces drain before the process exits.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Extension;
use axum_server::tls_rustls::RustlsConfig;
use tokio::task::JoinSet;

use crate::config::Interface;
use crate::error::ServeError;
use crate::http::connections::{self, Drained};
use crate::http::pipeline::Pipeline;
use crate::lifecycle::Shutdown;
use crate::net::tls::{tls_context, CertificateProvider, TlsListener};
use crate::net::{BoundListener, ListenTarget, ListenerResolver, TransportFlags, TransportMode};
use crate::observability::Tracer;
use crate::security::TransportSecurity;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to serve one interface.
#[derive(Debug)]
pub struct InterfaceSpec {
    pub interface: Interface,
    pub pipeline: Pipeline,
    pub target: ListenTarget,
    pub flags: TransportFlags,
    /// Transport selected at bootstrap.
    pub mode: TransportMode,
    pub tls_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Initializing,
    Binding,
    Serving,
    ShuttingDown,
    Terminated,
    BindFailed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskState::Initializing => "initializing",
            TaskState::Binding => "binding",
            TaskState::Serving => "serving",
            TaskState::ShuttingDown => "shutting_down",
            TaskState::Terminated => "terminated",
            TaskState::BindFailed => "bind_failed",
        })
    }
}

pub(crate) fn transition(interface: Interface, state: TaskState) {
    tracing::debug!(interface = %interface, state = %state, "Serving task state changed");
}

/// Terminal result of one serving task.
#[derive(Debug)]
pub struct TaskOutcome {
    pub interface: Interface,
    pub result: Result<(), ServeError>,
}

/// Outcomes of every task spawned by [`ServeCoordinator::run`].
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<TaskOutcome>,
}

impl RunSummary {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcome(&self, interface: Interface) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.interface == interface)
    }

    /// First fatal error, if any task failed.
    pub fn into_result(self) -> Result<(), ServeError> {
        self.outcomes
            .into_iter()
            .map(|o| o.result)
            .find(Result::is_err)
            .unwrap_or(Ok(()))
    }
}

/// Runs interfaces concurrently and waits for all of them.
#[derive(Clone)]
pub struct ServeCoordinator {
    resolver: ListenerResolver,
    certificates: Arc<dyn CertificateProvider>,
    tracer: Tracer,
    shutdown: Shutdown,
    drain_timeout: Duration,
}

impl ServeCoordinator {
    pub fn new(
        resolver: ListenerResolver,
        certificates: Arc<dyn CertificateProvider>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            resolver,
            certificates,
            tracer: Tracer::disabled(),
            shutdown,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Serve every interface until shutdown or a fatal error, then return
    /// once all tasks reached a terminal state.
    pub async fn run(&self, specs: Vec<InterfaceSpec>) -> RunSummary {
        let mut tasks = JoinSet::new();
        let mut interfaces = HashMap::new();

        for spec in specs {
            let interface = spec.interface;
            let task = ServingTask {
                coordinator: self.clone(),
                spec,
            };
            let handle = tasks.spawn(task.run());
            interfaces.insert(handle.id(), interface);
        }
        tracing::info!(tasks = tasks.len(), "Started serving tasks");

        let mut summary = RunSummary::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (interface, result) = match joined {
                Ok((id, result)) => match interfaces.get(&id) {
                    Some(interface) => (*interface, result),
                    None => continue,
                },
                Err(e) => match interfaces.get(&e.id()) {
                    Some(interface) => (
                        *interface,
                        Err(ServeError::Serve {
                            interface: *interface,
                            source: io::Error::other(e.to_string()),
                        }),
                    ),
                    None => continue,
                },
            };

            if let Err(e) = &result {
                tracing::error!(interface = %interface, error = %e, "Serving task failed");
                self.shutdown.trigger();
            }
            summary.outcomes.push(TaskOutcome { interface, result });
        }

        tracing::info!(tasks = summary.len(), "All serving tasks terminated");
        summary
    }
}

struct ServingTask {
    coordinator: ServeCoordinator,
    spec: InterfaceSpec,
}

impl ServingTask {
    async fn run(self) -> Result<(), ServeError> {
        let interface = self.spec.interface;
        let result = self.serve().await;
        transition(interface, TaskState::Terminated);
        result
    }

    async fn serve(self) -> Result<(), ServeError> {
        let ServingTask { coordinator, spec } = self;
        let interface = spec.interface;

        transition(interface, TaskState::Initializing);
        let mut router = spec.pipeline.into_router();
        if coordinator.tracer.is_loaded() {
            router = coordinator.tracer.trace(router);
        }

        transition(interface, TaskState::Binding);
        let bound = coordinator
            .bind(interface, &spec.target, &spec.flags, spec.mode, spec.tls_enabled)
            .await;
        let (listener, tls) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                transition(interface, TaskState::BindFailed);
                return Err(e);
            }
        };

        let mode = listener.mode(tls.is_some());
        tracing::info!(
            interface = %interface,
            address = %listener.describe(),
            transport = %mode,
            "Serving"
        );
        transition(interface, TaskState::Serving);

        if let Some(warning) = https_disabled_warning(interface, mode) {
            tracing::warn!(interface = %interface, "{}", warning);
        }

        let signal = coordinator.shutdown.subscribe();
        let drain_timeout = coordinator.drain_timeout;
        let drained = match (listener, tls) {
            (BoundListener::Unix { listener, path }, _) => {
                let router = router.layer(Extension(TransportSecurity::Plain));
                let drained = connections::serve(interface, listener, router, signal, drain_timeout).await;
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::debug!(path = %path.display(), error = %e, "Socket file not removed");
                }
                drained
            }
            (BoundListener::Tcp(listener), Some(tls)) => {
                let router = router.layer(Extension(TransportSecurity::Tls));
                connections::serve(interface, TlsListener::new(listener, tls), router, signal, drain_timeout).await
            }
            (BoundListener::Tunnel(listener), Some(tls)) => {
                let router = router.layer(Extension(TransportSecurity::Tls));
                connections::serve(interface, TlsListener::new(listener, tls), router, signal, drain_timeout).await
            }
            (BoundListener::Tcp(listener), None) => {
                let router = router.layer(Extension(TransportSecurity::Plain));
                connections::serve(interface, listener, router, signal, drain_timeout).await
            }
            (BoundListener::Tunnel(listener), None) => {
                let router = router.layer(Extension(TransportSecurity::Plain));
                connections::serve(interface, listener, router, signal, drain_timeout).await
            }
        };

        if let Drained::TimedOut { aborted } = drained {
            tracing::warn!(interface = %interface, aborted, "{}", DRAIN_TIMEOUT_WARNING);
        }
        tracing::info!(interface = %interface, "Server stopped");
        Ok(())
    }
}

/// Warning for a public interface answering plain HTTP on a TCP port.
pub const HTTPS_DISABLED_WARNING: &str =
    "HTTPS is disabled; make sure your proxy provides HTTPS and redirects HTTP to HTTPS";

/// Warning for connections still open when the drain timeout passed.
pub const DRAIN_TIMEOUT_WARNING: &str = "Drain timeout exceeded; closed remaining connections";

fn https_disabled_warning(interface: Interface, mode: TransportMode) -> Option<&'static str> {
    (interface == Interface::Public && mode == TransportMode::PlainTcp).then_some(HTTPS_DISABLED_WARNING)
}

impl ServeCoordinator {
    /// Certificates first, then the listener. Filesystem sockets never get
    /// a TLS context.
    async fn bind(
        &self,
        interface: Interface,
        target: &ListenTarget,
        flags: &TransportFlags,
        mode: TransportMode,
        tls_enabled: bool,
    ) -> Result<(BoundListener, Option<RustlsConfig>), ServeError> {
        let tls = if tls_enabled && mode != TransportMode::UnixSocket {
            let material = self.certificates.certificates(interface).await?;
            Some(tls_context(interface, material).await?)
        } else {
            None
        };
        let listener = self.resolver.resolve(target, flags).await?;
        Ok((listener, tls))
    }
}
