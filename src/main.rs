//! Serve orchestrator
//!
//! Runs the admin and public HTTP interfaces of the service.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                    SERVE ORCHESTRATOR                     │
//!                 │                                                           │
//!   CLI + config  │  ┌───────────┐    ┌──────────────┐    ┌───────────────┐  │
//!  ───────────────┼─▶│ lifecycle │───▶│     http     │───▶│      net      │  │
//!                 │  │ bootstrap │    │  pipelines + │    │   listener    │  │
//!                 │  └───────────┘    │  coordinator │    │   resolver    │  │
//!                 │                   └──────┬───────┘    └───────┬───────┘  │
//!                 │                          │                    │          │
//!                 │               admin task │ public task        │ unix/tcp │
//!                 │                          ▼                    ▼ tls/tunnel
//!                 │  ┌─────────────────────────────────────────────────────┐ │
//!                 │  │                Cross-Cutting Concerns                │ │
//!                 │  │  config · security gate · observability · health     │ │
//!                 │  └─────────────────────────────────────────────────────┘ │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use serve_orchestrator::config::watcher::ConfigWatcher;
use serve_orchestrator::config::{load_config, LiveConfig, ServeConfig};
use serve_orchestrator::lifecycle::{signals, worker_threads, CommandContext, ServeMode};
use serve_orchestrator::net::{ConfiguredCertificateProvider, ListenerResolver, UnavailableTunnel};
use serve_orchestrator::observability::{logging, MetricsRegistry, Tracer};
use serve_orchestrator::{Bootstrapper, BuildInfo, ServeCoordinator, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "serve-orchestrator", version, about = "Serve the admin and public HTTP interfaces")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start serving one or both interfaces.
    Serve(ServeArgs),
}

#[derive(Debug, clap::Args)]
struct ServeArgs {
    /// Interfaces to serve.
    #[arg(value_enum)]
    interfaces: Interfaces,

    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Expose the admin interface over the overlay tunnel named by TUNNEL_SERVICE.
    #[arg(long)]
    tunnel_mode: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Interfaces {
    All,
    Admin,
    Public,
}

impl From<Interfaces> for ServeMode {
    fn from(value: Interfaces) -> Self {
        match value {
            Interfaces::All => ServeMode::All,
            Interfaces::Admin => ServeMode::Admin,
            Interfaces::Public => ServeMode::Public,
        }
    }
}

fn main() -> ExitCode {
    let Command::Serve(args) = Cli::parse().command;

    let config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => ServeConfig::default(),
    };
    logging::init(&config.log);

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if let Some(threads) = worker_threads(&config) {
        tracing::info!(worker_threads = threads, "Sizing worker pool from CPU quota");
        runtime.worker_threads(threads);
    }
    let runtime = match runtime.build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(args, config)) {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServeArgs, config: ServeConfig) -> Result<(), Box<dyn Error>> {
    let live = LiveConfig::new(config.clone());
    let _watcher = args
        .config
        .as_deref()
        .map(|path| ConfigWatcher::new(path, live.clone()).run())
        .transpose()?;

    let metrics = MetricsRegistry::install()?;
    let shutdown = Shutdown::new();
    tokio::spawn(signals::listen(shutdown.clone()));

    let mode = ServeMode::from(args.interfaces);
    let context = CommandContext::from_env(mode, args.tunnel_mode);
    let artifacts = Bootstrapper::new(live, Arc::new(BuildInfo::current()), metrics).setup(&context)?;

    let coordinator = ServeCoordinator::new(
        ListenerResolver::new(Arc::new(UnavailableTunnel)),
        Arc::new(ConfiguredCertificateProvider::new(config.clone())),
        shutdown,
    )
    .with_tracer(Tracer::from_config(&config.tracing))
    .with_drain_timeout(Duration::from_secs(config.serve.shutdown_timeout_secs));

    coordinator.run(artifacts.select(mode)).await.into_result()?;
    Ok(())
}
