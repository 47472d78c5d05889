//! halabel
//!
//! Exposes the HA state of a process running in a Kubernetes pod as labels
//! on that pod, so load balancers and operators can select the active
//! instance from pod metadata alone.

mod cli;
mod config;
mod events;
mod metrics_server;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use config::Config;
use halabel_k8s::{Credentials, K8sClient, KubernetesRegistration, StaticCredentials};

/// Initialize the tracing/logging subsystem
fn init_logging(log_level: &str, json_format: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Connect with fixed credentials when an API server is given, otherwise
/// discover in-cluster credentials.
async fn build_client(
    api_server: Option<&str>,
    token: Option<&str>,
    ca_file: Option<&Path>,
) -> Result<K8sClient> {
    let client = match (api_server, token) {
        (Some(api_server), Some(token)) => {
            let ca_bundle = match ca_file {
                Some(path) => Some(
                    tokio::fs::read(path)
                        .await
                        .with_context(|| format!("Failed to read CA bundle {:?}", path))?,
                ),
                None => None,
            };
            let source = StaticCredentials::new(Credentials::new(api_server, token, ca_bundle));
            K8sClient::with_source(Arc::new(source)).await
        }
        _ => K8sClient::new().await,
    };
    let client = client.context("Failed to create Kubernetes client")?;
    info!(api_server = %client.api_server(), "Kubernetes client ready");
    Ok(client)
}

/// Register the pod, then keep it labeled until shutdown
async fn run(
    config: Config,
    client: K8sClient,
    stdin_events: bool,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    // Final labels are written only after the event forwarder has stopped.
    let (finalize_tx, finalize_rx) = watch::channel(false);
    let (registration, finalizer) = KubernetesRegistration::with_client(
        Arc::new(client),
        finalize_rx,
        &config.service_registration,
        &config.state,
    )
    .await
    .context("Failed to start service registration")?;

    // Start metrics server if enabled
    if config.metrics.enabled {
        let port = config.metrics.port;
        tokio::spawn(async move {
            if let Err(e) = metrics_server::start(port).await {
                error!(error = %e, "Metrics server failed");
            }
        });
    }

    let forwarder = stdin_events.then(|| {
        let registration = registration.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) = events::forward_events(stdin, &registration, shutdown).await {
                error!(error = %e, "Reading state events failed");
            }
        })
    });

    let mut shutdown = shutdown_rx;
    let _ = shutdown.wait_for(|stop| *stop).await;
    let deadline = Instant::now() + config.shutdown_timeout;

    if let Some(mut forwarder) = forwarder {
        if timeout_at(deadline, &mut forwarder).await.is_err() {
            warn!("State event forwarder did not stop in time, aborting it");
            forwarder.abort();
        }
    }

    let _ = finalize_tx.send(true);
    match timeout_at(deadline, finalizer).await {
        Ok(Ok(())) => info!(
            namespace = registration.namespace(),
            pod = registration.pod_name(),
            "halabel shutdown complete"
        ),
        Ok(Err(e)) => error!(error = %e, "Shutdown task failed"),
        Err(_) => warn!(
            timeout = ?config.shutdown_timeout,
            "Timed out waiting for final labels"
        ),
    }
    Ok(())
}

/// Resolve once Ctrl+C or SIGTERM arrives
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;

        tokio::select! {
            res = signal::ctrl_c() => {
                res.context("Failed to install Ctrl+C handler")?;
                info!("Received Ctrl+C, initiating shutdown");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")?;
        info!("Received Ctrl+C, initiating shutdown");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(&cli.log_level, cli.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "halabel starting");

    // Load configuration
    let config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("Failed to load config from {:?}", cli.config))?
    } else {
        warn!(path = ?cli.config, "Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    let config = config.with_overrides(cli.namespace.clone(), cli.pod_name.clone());

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    let client = build_client(
        cli.api_server.as_deref(),
        cli.token.as_deref(),
        cli.ca_file.as_deref(),
    )
    .await?;

    // Setup shutdown signal handler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            error!(error = %e, "Signal handling failed, shutting down");
        }
        let _ = shutdown_tx.send(true);
    });

    run(config, client, cli.stdin_events, shutdown_rx).await
}
