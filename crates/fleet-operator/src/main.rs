//! Fleet Operator - multi-cluster client bootstrap with restart-on-drift

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};
use tracing::info;

use fleet_clientconfig::{
    bootstrap, Dispatcher, KubeClusterFactory, KubeConfigStore, ShutdownSignal,
};
use fleet_common::crd::ClientConfig;
use fleet_common::telemetry::{init_telemetry, TelemetryConfig};
use fleet_operator::config::OperatorConfig;
use fleet_operator::forward_signals;
use fleet_operator::registrar::ConnectivityRegistrar;

/// Fleet - connects to remote clusters described by ClientConfig resources
#[derive(Parser, Debug)]
#[command(name = "fleet-operator", version, about, long_about = None)]
struct Cli {
    /// Print the ClientConfig CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Bootstraps one client per ClientConfig, then watches ClientConfigs and
    /// their kubeconfig Secrets. Any change to either exits the process with
    /// status 0 so it restarts with a fresh topology.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install aws-lc-rs crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&ClientConfig::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let config = OperatorConfig::from_env().context("invalid operator configuration")?;
    let _telemetry = init_telemetry(TelemetryConfig {
        otlp_endpoint: config.otlp_endpoint.clone(),
        ..Default::default()
    })?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(config).await,
    }
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    info!(
        scope = %config.scope,
        concurrency = config.concurrency,
        version = env!("CARGO_PKG_VERSION"),
        "Starting fleet operator"
    );

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let store = Arc::new(KubeConfigStore::new(client.clone()));

    // A partial topology is never served
    let topology = bootstrap(
        store.as_ref(),
        &KubeClusterFactory,
        &ConnectivityRegistrar,
        &config.scope,
    )
    .await
    .context("bootstrap failed")?;
    info!(
        clusters = ?topology.cache.identities().collect::<Vec<_>>(),
        secrets = topology.secret_index.len(),
        "Bootstrap complete"
    );

    let shutdown = ShutdownSignal::new();
    tokio::spawn(forward_signals(shutdown.clone()));

    Dispatcher::new(store, topology.secret_index.clone(), shutdown.clone())
        .concurrency(config.concurrency)
        .run(client, &config.scope)
        .await
        .context("drift watch failed")?;

    info!(
        reason = %shutdown.reason().unwrap_or_default(),
        "Fleet operator exiting for restart"
    );
    Ok(())
}
