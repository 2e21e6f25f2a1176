//! service-check - polls declared services and deletes the Service of any
//! that fail their health check so the owning reconciler recreates it.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use service_check::{
    kube_client, Cli, ConfigMapSource, LogFormat, RuntimeConfig, Scheduler, ServiceRemover,
    ShellProber,
};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_cli(Cli::parse()).context("invalid runtime configuration")?;
    init_tracing(config.log_format);

    info!(
        "Starting service-check v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube_client::connect(&config.credentials)
        .await
        .context("failed to connect to Kubernetes")?;
    info!("Connected to Kubernetes cluster");

    info!(
        configmap = %config.scheduler.configmap_name,
        namespace = %config.scheduler.configmap_namespace,
        "Reading service checks from ConfigMap"
    );

    let scheduler = Scheduler::new(
        config.scheduler.clone(),
        Arc::new(ConfigMapSource::new(client.clone())),
        Arc::new(ShellProber::new()),
        Arc::new(ServiceRemover::new(client)),
    );

    if config.once {
        let report = scheduler
            .run_once()
            .await
            .context("failed to load service checks")?;
        info!(checked = report.total(), "Single pass finished");
        return Ok(());
    }

    scheduler
        .run_until(shutdown_signal())
        .await
        .with_context(|| {
            format!(
                "error loading service checks from ConfigMap {}.{}",
                config.scheduler.configmap_name, config.scheduler.configmap_namespace
            )
        })?;

    info!("service-check stopped");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM; the poll loop then stops at the
/// next tick boundary.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;

        let mut sigterm = match signal::unix::signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, stopping on Ctrl+C only");
                let _ = signal::ctrl_c().await;
                info!(signal = "SIGINT", "Stopping service checks after current pass");
                return;
            }
        };

        let received = tokio::select! {
            _ = signal::ctrl_c() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        info!(signal = received, "Stopping service checks after current pass");
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!(signal = "SIGINT", "Stopping service checks after current pass");
    }
}
