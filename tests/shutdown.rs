//! Shutdown behaviour observed through the coordinator and its logs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;

use serve_orchestrator::config::LiveConfig;
use serve_orchestrator::http::{DRAIN_TIMEOUT_WARNING, HTTPS_DISABLED_WARNING};
use serve_orchestrator::lifecycle::ServeMode;
use serve_orchestrator::net::{ConfiguredCertificateProvider, ListenerResolver, UnavailableTunnel};
use serve_orchestrator::routing::RouteRegistrar;
use serve_orchestrator::{ServeConfig, ServeCoordinator, Shutdown};

mod common;

/// Public `/slow` route that records whether its handler ran to the end.
struct SlowRoute {
    delay: Duration,
    completed: Arc<AtomicBool>,
}

impl RouteRegistrar for SlowRoute {
    fn register_admin(&self, router: Router) -> Router {
        router
    }

    fn register_public(&self, router: Router) -> Router {
        let delay = self.delay;
        let completed = self.completed.clone();
        router.route(
            "/slow",
            get(move || {
                let completed = completed.clone();
                async move {
                    tokio::time::sleep(delay).await;
                    completed.store(true, Ordering::SeqCst);
                    "done"
                }
            }),
        )
    }
}

fn public_config(port: u16) -> ServeConfig {
    let mut config = common::config();
    config.serve.public.host = "127.0.0.1".into();
    config.serve.public.port = port;
    config
}

fn coordinator(config: &ServeConfig, shutdown: Shutdown, drain: Duration) -> ServeCoordinator {
    ServeCoordinator::new(
        ListenerResolver::new(Arc::new(UnavailableTunnel)),
        Arc::new(ConfiguredCertificateProvider::new(config.clone())),
        shutdown,
    )
    .with_drain_timeout(drain)
}

#[tokio::test]
async fn plaintext_public_warns_that_https_is_disabled() {
    let logs = common::CapturedLogs::default();
    let _guard = logs.install();

    let port = common::free_port().await;
    let config = public_config(port);
    let artifacts = common::bootstrapper(LiveConfig::new(config.clone()))
        .setup(&common::context(ServeMode::Public))
        .unwrap();

    let shutdown = Shutdown::new();
    let coordinator = coordinator(&config, shutdown.clone(), Duration::from_secs(2));
    let run = tokio::spawn(async move { coordinator.run(artifacts.select(ServeMode::Public)).await });
    common::eventually(|| common::tcp_is_up(port)).await;

    shutdown.trigger();
    let summary = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(summary.into_result().is_ok());

    let output = logs.contents();
    assert!(output.contains(HTTPS_DISABLED_WARNING), "{output}");
    assert!(!output.contains(DRAIN_TIMEOUT_WARNING), "{output}");
}

#[tokio::test]
async fn drain_timeout_closes_slow_request_and_still_succeeds() {
    let logs = common::CapturedLogs::default();
    let _guard = logs.install();

    let port = common::free_port().await;
    let config = public_config(port);
    let completed = Arc::new(AtomicBool::new(false));
    let artifacts = common::bootstrapper(LiveConfig::new(config.clone()))
        .with_registrar(Arc::new(SlowRoute {
            delay: Duration::from_secs(3),
            completed: completed.clone(),
        }))
        .setup(&common::context(ServeMode::Public))
        .unwrap();

    let shutdown = Shutdown::new();
    let coordinator = coordinator(&config, shutdown.clone(), Duration::from_millis(500));
    let run = tokio::spawn(async move { coordinator.run(artifacts.select(ServeMode::Public)).await });
    common::eventually(|| common::tcp_is_up(port)).await;

    let request = tokio::spawn(reqwest::get(format!("http://127.0.0.1:{port}/slow")));
    tokio::time::sleep(Duration::from_millis(300)).await;

    let triggered = Instant::now();
    shutdown.trigger();
    let summary = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(triggered.elapsed() < Duration::from_secs(2));
    assert!(summary.into_result().is_ok());

    // The connection was closed under the client, not answered
    let response = request.await.unwrap();
    assert!(response.is_err());

    // Past the handler's own deadline: it was dropped, not left running
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!completed.load(Ordering::SeqCst));

    let output = logs.contents();
    assert!(output.contains(DRAIN_TIMEOUT_WARNING), "{output}");
}

#[tokio::test]
async fn slow_request_finishing_within_drain_is_answered() {
    let port = common::free_port().await;
    let config = public_config(port);
    let completed = Arc::new(AtomicBool::new(false));
    let artifacts = common::bootstrapper(LiveConfig::new(config.clone()))
        .with_registrar(Arc::new(SlowRoute {
            delay: Duration::from_millis(500),
            completed: completed.clone(),
        }))
        .setup(&common::context(ServeMode::Public))
        .unwrap();

    let shutdown = Shutdown::new();
    let coordinator = coordinator(&config, shutdown.clone(), Duration::from_secs(5));
    let run = tokio::spawn(async move { coordinator.run(artifacts.select(ServeMode::Public)).await });
    common::eventually(|| common::tcp_is_up(port)).await;

    let request = tokio::spawn(reqwest::get(format!("http://127.0.0.1:{port}/slow")));
    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.trigger();

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "done");
    assert!(completed.load(Ordering::SeqCst));

    let summary = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
    assert!(summary.into_result().is_ok());
}
