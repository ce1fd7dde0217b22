//! filedrop server binary

use anyhow::Context;
use filedrop_engine::{Ingestor, ProgressObserver, ProgressRegistry};
use filedrop_server::logging::init_logging;
use filedrop_server::render::{IndicatifObserver, LogObserver};
use filedrop_server::{cli, FileDropServer, ServerConfig};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let config = ServerConfig::from_matches(&matches)?;

    init_logging(config.verbosity, config.log_format, config.color)?;

    if !config.path.exists() {
        std::fs::create_dir_all(&config.path)
            .with_context(|| format!("Failed to create {}", config.path.display()))?;
        info!("Created destination directory: {}", config.path.display());
    }
    if !config.path.is_dir() {
        anyhow::bail!("{} is not a directory", config.path.display());
    }

    let observer: Arc<dyn ProgressObserver> = if config.progress {
        Arc::new(IndicatifObserver::new())
    } else {
        Arc::new(LogObserver)
    };
    let registry = ProgressRegistry::new(observer);
    let ingestor = Ingestor::new(config.ingest_config(), registry);

    info!("Starting server on {}", config.listen);
    info!("Saving files to {}", config.path.display());
    if !config.strict_names {
        warn!(
            "Client file names are used as-is; \
             pass --strict-names to confine uploads to the target directory"
        );
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    FileDropServer::new(ingestor)
        .serve(config.listen, shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    info!("Server shutdown gracefully");
    Ok(())
}
