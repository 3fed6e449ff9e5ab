use std::sync::Arc;

use bridge_relayer::chains::{Chain, DepositHandler, EvmChain, ObserverSet, UtxoChain};
use bridge_relayer::config::Config;
use bridge_relayer::registry::ChainRegistry;
use bridge_relayer::relay::Relay;
use bridge_relayer::signer::LocalKeySigner;

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    // Run the async main
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    tracing::info!("Starting bridge relayer");

    let config = Config::load()?;
    tracing::info!(
        utxo = config.utxo.is_some(),
        evm = config.evm.is_some(),
        "Configuration loaded"
    );

    // Build the registry during single-threaded startup; read-only afterward
    let mut registry = ChainRegistry::new();
    if let Some(ref utxo) = config.utxo {
        registry.register(Arc::new(UtxoChain::new(utxo, &config.observer)?))?;
    }
    if let Some(ref evm) = config.evm {
        registry.register(Arc::new(EvmChain::connect(evm, &config.observer).await?))?;
    }
    let registry = Arc::new(registry);
    tracing::info!(chains = registry.chains().len(), "Chain registry built");

    let signer = Arc::new(LocalKeySigner::new(&config.signer.private_key)?);
    tracing::info!(signer_address = %signer_address(&*signer), "Signer initialized");
    let relay: Arc<dyn DepositHandler> = Arc::new(Relay::new(registry.clone(), signer));

    let mut observers = ObserverSet::new();
    for chain in registry.chains() {
        let handle = chain.start_observing(relay.clone()).await?;
        observers.push(chain.name(), handle);
    }
    tracing::info!(observers = observers.len(), "Observers started");

    // Shutdown plumbing
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    // Metrics/health server
    let api_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api.port));
    tokio::spawn(async move {
        if let Err(e) = bridge_relayer::api::start_api_server(api_addr).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    let result = observers.run(shutdown_rx).await;

    tracing::info!("Bridge relayer stopped");
    result
}

fn signer_address(signer: &impl bridge_relayer::signer::ThresholdSigner) -> String {
    format!("{:?}", signer.address())
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bridge_relayer=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
