use std::path::PathBuf;

use clap::Parser;

use gateway_registry::config::load_config;
use gateway_registry::lifecycle;
use gateway_registry::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "gateway-registry")]
#[command(about = "Registry control plane for the federated query gateway", long_about = None)]
struct Args {
    /// TOML configuration file; defaults apply when absent.
    #[arg(short, long, env = "REGISTRY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gateway-registry starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = ?config.storage.backend,
        reconciliation = config.reconciliation.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    lifecycle::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
