//! Ferry daemon entry point.

mod app;
mod config;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ferryd");

    let config = config::Config::load()?;
    tracing::info!(
        storage_dir = %config.storage_dir.display(),
        socket_port = config.socket_port,
        rpc_port = config.rpc_port,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("ferryd shut down cleanly");
    Ok(())
}
