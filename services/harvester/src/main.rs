//! Token harvester
//!
//! Single binary with two commands:
//! - `harvest` (default): drain the pending-accounts ledger through the
//!   login helper, one account at a time, writing tokens to the token ledger
//! - `serve`: run the credential-injecting gateway over the harvested tokens

mod config;
mod gateway;
mod metrics;

use anyhow::{Context, Result, bail};
use authenticator::CommandAuthenticator;
use axum::Router;
use common::Token;
use ledger::{FileStore, Ledger};
use metrics_exporter_prometheus::PrometheusHandle;
use pipeline::{BatchReport, CommandEgressCycler, Ledgers, Pipeline};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use token_pool::{JsonSnapshot, RotationPool};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::gateway::{AdminState, GatewayState};

/// How long in-flight gateway requests may take to finish after a signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit status when a batch halts on an authentication failure.
const EXIT_HALTED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Harvest,
    Serve,
}

#[derive(Debug, PartialEq, Eq)]
struct Cli {
    config_path: Option<String>,
    command: Command,
}

/// `token-harvester [--config PATH] [harvest|serve]`
fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Cli> {
    let mut config_path = None;
    let mut command = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(args.next().context("--config requires a path")?);
            }
            "harvest" | "serve" if command.is_some() => bail!("more than one command given"),
            "harvest" => command = Some(Command::Harvest),
            "serve" => command = Some(Command::Serve),
            other => bail!("unrecognized argument: {other}"),
        }
    }

    Ok(Cli {
        config_path,
        command: command.unwrap_or(Command::Harvest),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<u8> {
    let cli = parse_args(std::env::args().skip(1))?;

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    info!(path = %config_path.display(), command = ?cli.command, "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    match cli.command {
        Command::Harvest => {
            let report = harvest(&config).await?;
            Ok(exit_status(&report))
        }
        Command::Serve => {
            // Install Prometheus metrics recorder before any metrics are emitted
            let prometheus = metrics::install_recorder();
            serve(&config, prometheus).await?;
            Ok(0)
        }
    }
}

/// Run one batch over the configured ledgers.
async fn harvest(config: &Config) -> Result<BatchReport> {
    let auth = config
        .authenticator
        .as_ref()
        .context("an [authenticator] section is required for harvest")?;

    let authenticator = Arc::new(CommandAuthenticator::new(
        auth.program.clone(),
        auth.args.clone(),
        Duration::from_secs(auth.timeout_secs),
    ));
    let egress = Arc::new(CommandEgressCycler::new(config.egress.program.clone()));
    let ledgers = Ledgers {
        pending: Arc::new(FileStore::new(&config.ledgers.pending)),
        authenticated: Arc::new(FileStore::new(&config.ledgers.authenticated)),
        tokens: Arc::new(FileStore::new(&config.ledgers.tokens)),
        proxies: Arc::new(FileStore::new(&config.ledgers.proxies)),
    };

    let mut pipeline = Pipeline::load(config.pipeline_config(), ledgers, authenticator, egress)
        .await
        .context("failed to load ledgers")?;

    Ok(pipeline.run().await)
}

fn exit_status(report: &BatchReport) -> u8 {
    if report.halted() { EXIT_HALTED } else { 0 }
}

/// Serve the gateway and admin listeners until SIGINT/SIGTERM.
async fn serve(config: &Config, prometheus: PrometheusHandle) -> Result<()> {
    let gateway_config = config
        .gateway
        .as_ref()
        .context("a [gateway] section is required for serve")?;

    let tokens: Ledger<Token> = Ledger::open(Arc::new(FileStore::new(&config.ledgers.tokens)))
        .await
        .context("failed to load token ledger")?;
    let snapshot = JsonSnapshot::new(&config.ledgers.snapshot);
    let pool = Arc::new(RotationPool::new(tokens.entries().to_vec(), &snapshot).await);
    info!(tokens = pool.len(), upstream_url = %gateway_config.upstream_url, "rotation pool ready");

    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let app = gateway::build_router(GatewayState {
        pool: pool.clone(),
        client,
        upstream_url: gateway_config.upstream_url.clone(),
        timeout: Duration::from_secs(gateway_config.timeout_secs),
        login_paths: gateway_config.login_paths.clone().into(),
        max_connections: gateway_config.max_connections,
    });
    let admin = gateway::build_admin_router(AdminState {
        pool,
        prometheus,
        started_at: Instant::now(),
    });

    let listener = TcpListener::bind(gateway_config.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", gateway_config.listen_addr))?;
    let admin_listener = TcpListener::bind(gateway_config.admin_addr)
        .await
        .with_context(|| format!("failed to bind to {}", gateway_config.admin_addr))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let gateway_server = spawn_server("gateway", listener, app, shutdown_rx.clone());
    let admin_server = spawn_server("admin", admin_listener, admin, shutdown_rx);

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    // The drain timer starts at signal receipt
    match tokio::time::timeout(DRAIN_TIMEOUT, async {
        tokio::join!(gateway_server, admin_server)
    })
    .await
    {
        Ok(results) => {
            for result in [results.0, results.1] {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(error = %e, "server error during shutdown"),
                    Err(e) => error!(error = %e, "server task panicked"),
                }
            }
            info!("all in-flight requests drained");
        }
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

fn spawn_server(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            info!(listener = name, addr = %addr, "accepting requests");
        }
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
    })
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
