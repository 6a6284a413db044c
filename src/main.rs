//! clientcert - keeps the agent's hub client certificate issued and fresh

use std::sync::Arc;

use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clientcert::config::{ClientCertArgs, LogFormat};
use clientcert::controller::ClientCertController;
use clientcert::csr::{CsrControl, KubeCsrControl};
use clientcert::events::KubeEventPublisher;
use clientcert::runner;
use clientcert::store::KubeSecretStore;
use clientcert::CONTROLLER_NAME;

/// Provision and rotate the hub mTLS client certificate via signing requests
#[derive(Parser, Debug)]
#[command(name = "clientcert", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    args: ClientCertArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();
    init_tracing(cli.args.log_format);

    let hub_ca = match &cli.args.hub_ca_file {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read hub CA file {:?}: {}", path, e))?,
        ),
        None => None,
    };
    let hub_kubeconfig = cli.args.hub_kubeconfig.clone();
    let config = cli.args.into_config(hub_ca)?;

    let spoke = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
    let hub = match hub_kubeconfig {
        Some(path) => hub_client(&path).await?,
        None => spoke.clone(),
    };

    let store = KubeSecretStore::new(spoke.clone());
    let csr = KubeCsrControl::new(hub, config.csr_options.label_selector());
    let events = KubeEventPublisher::new(spoke, CONTROLLER_NAME);

    let triggers = runner::triggers(
        store.changes(
            &config.cert_options.secret_namespace,
            &config.cert_options.secret_name,
        ),
        csr.subscribe(),
    );

    let controller = ClientCertController::new(
        config.cert_options,
        config.csr_options,
        Arc::new(store),
        Arc::new(csr),
        Arc::new(events),
    )?
    .with_call_timeout(config.call_timeout);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
        }
        signal.cancel();
    });

    runner::run(controller, triggers, config.runner, shutdown).await?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,clientcert=debug,kube=info"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
    }
}

/// Client for the hub, built from a kubeconfig file
async fn hub_client(path: &std::path::Path) -> anyhow::Result<Client> {
    let kubeconfig = Kubeconfig::read_from(path)
        .map_err(|e| anyhow::anyhow!("Failed to read hub kubeconfig {:?}: {}", path, e))?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load hub kubeconfig {:?}: {}", path, e))?;
    Client::try_from(config)
        .map_err(|e| anyhow::anyhow!("Failed to create hub client: {}", e))
}
